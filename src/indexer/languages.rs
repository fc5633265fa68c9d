use tree_sitter::Language;

use super::code_parser::ChunkKind;

/// Chunking strategy, selected once per file from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Python,
    Java,
    Go,
    Rust,
    JavaScript,
    TypeScript,
    CFamily,
    Generic,
}

/// How much a strategy can guarantee about the chunks it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Grammar-backed; a tree with syntax errors yields no chunks.
    Exact,
    /// Grammar-backed; syntax errors are skipped over.
    Tolerant,
    /// Regex scan for signatures, false positives accepted.
    Pattern,
    /// Single `function name(...) {` pattern.
    Fallback,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::Python,
        Strategy::Java,
        Strategy::Go,
        Strategy::Rust,
        Strategy::JavaScript,
        Strategy::TypeScript,
        Strategy::CFamily,
        Strategy::Generic,
    ];

    /// Map a file extension (with or without the leading dot, any case).
    #[must_use]
    pub fn for_extension(ext: &str) -> Self {
        let ext = normalize_extension(ext);
        Self::ALL
            .into_iter()
            .find(|s| s.extensions().contains(&ext.as_str()))
            .unwrap_or(Strategy::Generic)
    }

    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Strategy::Python => &["py", "pyi"],
            Strategy::Java => &["java"],
            Strategy::Go => &["go"],
            Strategy::Rust => &["rs"],
            Strategy::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Strategy::TypeScript => &["ts", "tsx"],
            Strategy::CFamily => &["c", "h", "cc", "cpp", "cxx", "hpp"],
            Strategy::Generic => &[],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Python => "python",
            Strategy::Java => "java",
            Strategy::Go => "go",
            Strategy::Rust => "rust",
            Strategy::JavaScript => "javascript",
            Strategy::TypeScript => "typescript",
            Strategy::CFamily => "c-family",
            Strategy::Generic => "generic",
        }
    }

    #[must_use]
    pub fn variant(self) -> Variant {
        match self {
            Strategy::Python | Strategy::Java | Strategy::Go | Strategy::Rust => Variant::Exact,
            Strategy::JavaScript | Strategy::TypeScript => Variant::Tolerant,
            Strategy::CFamily => Variant::Pattern,
            Strategy::Generic => Variant::Fallback,
        }
    }

    /// Grammar table for the AST-backed strategies.
    #[must_use]
    pub fn grammar(self) -> Option<LanguageConfig> {
        match self {
            Strategy::Python => Some(python_config()),
            Strategy::Java => Some(java_config()),
            Strategy::Go => Some(go_config()),
            Strategy::Rust => Some(rust_config()),
            Strategy::JavaScript => Some(javascript_config()),
            Strategy::TypeScript => Some(typescript_config()),
            Strategy::CFamily | Strategy::Generic => None,
        }
    }
}

/// Lowercase, strip a leading dot.
#[must_use]
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// What to do with a syntax node of a given kind.
#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Emit one chunk of this kind spanning the node.
    Emit(ChunkKind),
    /// Classify by the child in `field`; the chunk still spans the wrapper.
    Unwrap { field: &'static str },
    /// Emit the node itself, then apply the language's member rules to the
    /// children of its `body` field.
    Container { kind: ChunkKind, body: &'static str },
    /// Emit nothing; apply the member rules to this node's children.
    Descend,
}

pub struct LanguageConfig {
    pub name: &'static str,
    pub language: Language,
    /// Top-level node kind → rule.
    pub rules: &'static [(&'static str, Rule)],
    /// Rules applied inside container bodies.
    pub members: &'static [(&'static str, Rule)],
    /// Node kinds that are never chunked (comments).
    pub skip: &'static [&'static str],
    /// Node kinds glued onto the start of the following declaration.
    pub prefix: &'static [&'static str],
}

pub(crate) fn rule_for(rules: &[(&'static str, Rule)], kind: &str) -> Option<Rule> {
    rules.iter().find(|(k, _)| *k == kind).map(|(_, r)| *r)
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        language: tree_sitter_python::LANGUAGE.into(),
        rules: &[
            ("function_definition", Rule::Emit(ChunkKind::Function)),
            ("class_definition", Rule::Emit(ChunkKind::Class)),
            ("decorated_definition", Rule::Unwrap { field: "definition" }),
            ("import_statement", Rule::Emit(ChunkKind::Import)),
            ("import_from_statement", Rule::Emit(ChunkKind::Import)),
            ("future_import_statement", Rule::Emit(ChunkKind::Import)),
        ],
        members: &[],
        skip: &["comment"],
        prefix: &[],
    }
}

const JAVA_CLASS: Rule = Rule::Container {
    kind: ChunkKind::Class,
    body: "body",
};

fn java_config() -> LanguageConfig {
    LanguageConfig {
        name: "java",
        language: tree_sitter_java::LANGUAGE.into(),
        rules: &[
            ("import_declaration", Rule::Emit(ChunkKind::Import)),
            ("class_declaration", JAVA_CLASS),
            ("interface_declaration", JAVA_CLASS),
            ("enum_declaration", JAVA_CLASS),
            ("record_declaration", JAVA_CLASS),
        ],
        // Enum bodies keep their methods one level down.
        members: &[
            ("method_declaration", Rule::Emit(ChunkKind::Method)),
            ("constructor_declaration", Rule::Emit(ChunkKind::Method)),
            ("class_declaration", JAVA_CLASS),
            ("interface_declaration", JAVA_CLASS),
            ("enum_declaration", JAVA_CLASS),
            ("record_declaration", JAVA_CLASS),
            ("enum_body_declarations", Rule::Descend),
        ],
        skip: &["line_comment", "block_comment"],
        prefix: &[],
    }
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        name: "go",
        language: tree_sitter_go::LANGUAGE.into(),
        rules: &[
            ("function_declaration", Rule::Emit(ChunkKind::Function)),
            ("method_declaration", Rule::Emit(ChunkKind::Method)),
            ("type_declaration", Rule::Emit(ChunkKind::Class)),
            ("import_declaration", Rule::Emit(ChunkKind::Import)),
            ("const_declaration", Rule::Emit(ChunkKind::Variable)),
            ("var_declaration", Rule::Emit(ChunkKind::Variable)),
        ],
        members: &[],
        skip: &["comment"],
        prefix: &[],
    }
}

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        name: "rust",
        language: tree_sitter_rust::LANGUAGE.into(),
        rules: &[
            ("function_item", Rule::Emit(ChunkKind::Function)),
            ("struct_item", Rule::Emit(ChunkKind::Class)),
            ("enum_item", Rule::Emit(ChunkKind::Class)),
            ("union_item", Rule::Emit(ChunkKind::Class)),
            ("trait_item", Rule::Emit(ChunkKind::Class)),
            (
                "impl_item",
                Rule::Container {
                    kind: ChunkKind::Class,
                    body: "body",
                },
            ),
            ("use_declaration", Rule::Emit(ChunkKind::Import)),
            ("extern_crate_declaration", Rule::Emit(ChunkKind::Import)),
            ("const_item", Rule::Emit(ChunkKind::Variable)),
            ("static_item", Rule::Emit(ChunkKind::Variable)),
        ],
        members: &[("function_item", Rule::Emit(ChunkKind::Method))],
        skip: &["line_comment", "block_comment"],
        prefix: &["attribute_item"],
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        language: tree_sitter_javascript::LANGUAGE.into(),
        rules: &[
            ("function_declaration", Rule::Emit(ChunkKind::Function)),
            (
                "generator_function_declaration",
                Rule::Emit(ChunkKind::Function),
            ),
            ("class_declaration", Rule::Emit(ChunkKind::Class)),
            ("import_statement", Rule::Emit(ChunkKind::Import)),
            ("variable_declaration", Rule::Emit(ChunkKind::Variable)),
            ("lexical_declaration", Rule::Emit(ChunkKind::Variable)),
            ("export_statement", Rule::Unwrap {
                field: "declaration",
            }),
        ],
        members: &[],
        skip: &["comment"],
        prefix: &[],
    }
}

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        rules: &[
            ("function_declaration", Rule::Emit(ChunkKind::Function)),
            (
                "generator_function_declaration",
                Rule::Emit(ChunkKind::Function),
            ),
            ("class_declaration", Rule::Emit(ChunkKind::Class)),
            ("abstract_class_declaration", Rule::Emit(ChunkKind::Class)),
            ("interface_declaration", Rule::Emit(ChunkKind::Class)),
            ("enum_declaration", Rule::Emit(ChunkKind::Class)),
            ("type_alias_declaration", Rule::Emit(ChunkKind::Class)),
            ("import_statement", Rule::Emit(ChunkKind::Import)),
            ("variable_declaration", Rule::Emit(ChunkKind::Variable)),
            ("lexical_declaration", Rule::Emit(ChunkKind::Variable)),
            ("export_statement", Rule::Unwrap {
                field: "declaration",
            }),
        ],
        members: &[],
        skip: &["comment"],
        prefix: &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(Strategy::for_extension("py"), Strategy::Python);
        assert_eq!(Strategy::for_extension(".py"), Strategy::Python);
        assert_eq!(Strategy::for_extension("JS"), Strategy::JavaScript);
        assert_eq!(Strategy::for_extension("java"), Strategy::Java);
        assert_eq!(Strategy::for_extension("cpp"), Strategy::CFamily);
        assert_eq!(Strategy::for_extension(".c"), Strategy::CFamily);
        assert_eq!(Strategy::for_extension("tsx"), Strategy::TypeScript);
        assert_eq!(Strategy::for_extension("kt"), Strategy::Generic);
        assert_eq!(Strategy::for_extension(""), Strategy::Generic);
    }

    #[test]
    fn test_variants_follow_grammar_availability() {
        for strategy in Strategy::ALL {
            let has_grammar = strategy.grammar().is_some();
            let ast = matches!(strategy.variant(), Variant::Exact | Variant::Tolerant);
            assert_eq!(has_grammar, ast, "{}", strategy.name());
        }
    }

    #[test]
    fn test_extension_sets_are_disjoint() {
        let mut seen = std::collections::HashSet::new();
        for strategy in Strategy::ALL {
            for ext in strategy.extensions() {
                assert!(seen.insert(*ext), "{ext} mapped twice");
            }
        }
    }
}
