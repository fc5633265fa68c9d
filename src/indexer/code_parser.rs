use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tree_sitter::{Node, Parser};

use super::heuristic;
use super::languages::{LanguageConfig, Rule, Strategy, Variant, rule_for};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Method,
    Import,
    Variable,
    Other,
}

impl ChunkKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Method => "method",
            ChunkKind::Import => "import",
            ChunkKind::Variable => "variable",
            ChunkKind::Other => "other",
        }
    }

    fn is_named(self) -> bool {
        matches!(
            self,
            ChunkKind::Function | ChunkKind::Class | ChunkKind::Method | ChunkKind::Variable
        )
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declaration recovered from a source file.
///
/// `content` is always `source[byte_range]` when a range is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeChunk {
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub content: String,
    pub byte_range: Option<Range<usize>>,
}

impl CodeChunk {
    pub(crate) fn from_span(
        source: &str,
        kind: ChunkKind,
        name: Option<String>,
        range: Range<usize>,
    ) -> Self {
        Self {
            kind,
            name: if kind.is_named() { name } else { None },
            content: source[range.clone()].to_string(),
            byte_range: Some(range),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("failed to load {0} grammar: {1}")]
    Grammar(&'static str, String),

    #[error("{0} parser returned no tree")]
    NoTree(&'static str),

    #[error("syntax error in {lang} source at line {line}, column {column}")]
    Syntax {
        lang: &'static str,
        line: usize,
        column: usize,
    },
}

/// Split `code` into top-level chunks using the strategy for `extension`.
///
/// Never fails: a parse error is logged and yields an empty sequence.
#[must_use]
pub fn chunk(code: &str, extension: &str) -> Vec<CodeChunk> {
    let strategy = Strategy::for_extension(extension);
    match chunk_with(code, strategy) {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(strategy = strategy.name(), "chunking failed: {e}");
            Vec::new()
        }
    }
}

/// Like [`chunk`], but surfaces the parse failure to the caller.
pub fn try_chunk(code: &str, extension: &str) -> Result<Vec<CodeChunk>, ChunkError> {
    chunk_with(code, Strategy::for_extension(extension))
}

pub fn chunk_with(code: &str, strategy: Strategy) -> Result<Vec<CodeChunk>, ChunkError> {
    match strategy.variant() {
        Variant::Pattern => Ok(heuristic::c_family(code)),
        Variant::Fallback => Ok(heuristic::generic(code)),
        variant @ (Variant::Exact | Variant::Tolerant) => {
            let Some(config) = strategy.grammar() else {
                return Ok(heuristic::generic(code));
            };
            parse_code(code, &config, variant == Variant::Tolerant)
        }
    }
}

fn parse_code(
    source: &str,
    config: &LanguageConfig,
    tolerant: bool,
) -> Result<Vec<CodeChunk>, ChunkError> {
    let mut parser = Parser::new();
    parser
        .set_language(&config.language)
        .map_err(|e| ChunkError::Grammar(config.name, e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or(ChunkError::NoTree(config.name))?;
    let root = tree.root_node();

    if !tolerant && root.has_error() {
        let at = first_error(root).unwrap_or(root).start_position();
        return Err(ChunkError::Syntax {
            lang: config.name,
            line: at.row + 1,
            column: at.column + 1,
        });
    }

    let walker = TopLevel {
        source,
        config,
        tolerant,
    };
    let mut chunks = Vec::new();
    walker.visit_children(root, config.rules, true, &mut chunks);
    Ok(chunks)
}

struct TopLevel<'a> {
    source: &'a str,
    config: &'a LanguageConfig,
    tolerant: bool,
}

impl TopLevel<'_> {
    fn visit_children(
        &self,
        parent: Node,
        rules: &[(&'static str, Rule)],
        top_level: bool,
        out: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = parent.walk();
        let mut pending_start: Option<usize> = None;

        for child in parent.named_children(&mut cursor) {
            let kind = child.kind();
            if child.is_error() || child.is_missing() || self.config.skip.contains(&kind) {
                continue;
            }
            if self.config.prefix.contains(&kind) {
                pending_start.get_or_insert(child.start_byte());
                continue;
            }

            let start = pending_start.take().unwrap_or(child.start_byte());
            let span = start..child.end_byte();

            match rule_for(rules, kind) {
                Some(rule) => self.apply(child, rule, span, out),
                // Unmatched top-level statements are kept by the exact variant only.
                None if top_level && !self.tolerant => {
                    out.push(CodeChunk::from_span(self.source, ChunkKind::Other, None, span));
                }
                None => {}
            }
        }
    }

    fn apply(&self, node: Node, rule: Rule, span: Range<usize>, out: &mut Vec<CodeChunk>) {
        match rule {
            Rule::Emit(kind) => {
                let name = declared_name(node, self.source);
                out.push(CodeChunk::from_span(self.source, kind, name, span));
            }
            Rule::Unwrap { field } => {
                let Some(inner) = node.child_by_field_name(field) else {
                    if !self.tolerant {
                        out.push(CodeChunk::from_span(self.source, ChunkKind::Other, None, span));
                    }
                    return;
                };
                match rule_for(self.config.rules, inner.kind()) {
                    Some(inner_rule) => self.apply(inner, inner_rule, span, out),
                    None if !self.tolerant => {
                        out.push(CodeChunk::from_span(self.source, ChunkKind::Other, None, span));
                    }
                    None => {}
                }
            }
            Rule::Container { kind, body } => {
                let name = declared_name(node, self.source);
                out.push(CodeChunk::from_span(self.source, kind, name, span));
                if let Some(body) = node.child_by_field_name(body) {
                    self.visit_children(body, self.config.members, false, out);
                }
            }
            Rule::Descend => self.visit_children(node, self.config.members, false, out),
        }
    }
}

/// Name of a declaration: its `name` field, else its `type` field (Rust
/// `impl`), else the `name` of the first named child that has one (Go
/// `type_spec`, JS `variable_declarator`).
fn declared_name(node: Node, source: &str) -> Option<String> {
    let direct = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"));
    let found = direct.or_else(|| {
        let mut cursor = node.walk();
        node.named_children(&mut cursor)
            .find_map(|c| c.child_by_field_name("name"))
    })?;
    found
        .utf8_text(source.as_bytes())
        .ok()
        .map(ToString::to_string)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}
