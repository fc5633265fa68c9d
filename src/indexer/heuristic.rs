//! Regex-based chunking for languages without a grammar in the build.
//!
//! Signatures are matched with a regex and the body is recovered by counting
//! braces from the opening `{` of the match. Braces inside strings and
//! comments are counted too, so a chunk may end early or run to end of file.
//! Overlapping and false-positive matches are kept.

use std::sync::LazyLock;

use regex::Regex;

use super::code_parser::{ChunkKind, CodeChunk};

static C_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s+([A-Za-z_]\w*)\s*\([^)]*\)\s*\{").expect("valid regex")
});

static C_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+([A-Za-z_]\w*)\s*\{").expect("valid regex"));

static GENERIC_FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfunction\s+([A-Za-z_]\w*)\s*\([^)]*\)\s*\{").expect("valid regex")
});

const CONTROL_KEYWORDS: &[&str] = &["if", "while", "for", "switch", "return", "else", "do", "catch"];

/// C, C++ and their headers: function definitions and classes.
pub fn c_family(source: &str) -> Vec<CodeChunk> {
    let mut matches: Vec<(usize, usize, ChunkKind, String)> = Vec::new();

    for caps in C_FUNCTION_RE.captures_iter(source) {
        let (Some(whole), Some(ret), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        // `else if (x) {` and `return foo(x) {` are not definitions.
        if CONTROL_KEYWORDS.contains(&name.as_str()) || CONTROL_KEYWORDS.contains(&ret.as_str()) {
            continue;
        }
        matches.push((whole.start(), whole.end(), ChunkKind::Function, name.as_str().to_string()));
    }

    for caps in C_CLASS_RE.captures_iter(source) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        matches.push((whole.start(), whole.end(), ChunkKind::Class, name.as_str().to_string()));
    }

    matches.sort_by_key(|(start, ..)| *start);
    matches
        .into_iter()
        .map(|(start, open_end, kind, name)| {
            let end = block_end(source, open_end);
            CodeChunk::from_span(source, kind, Some(name), start..end)
        })
        .collect()
}

/// Last resort for unknown extensions: `function name(...) {` blocks.
pub fn generic(source: &str) -> Vec<CodeChunk> {
    GENERIC_FUNCTION_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let end = block_end(source, whole.end());
            Some(CodeChunk::from_span(
                source,
                ChunkKind::Function,
                Some(name),
                whole.start()..end,
            ))
        })
        .collect()
}

/// Byte offset just past the brace closing the block whose `{` ends at
/// `after_open`, or the end of `source` if it never closes.
fn block_end(source: &str, after_open: usize) -> usize {
    let mut depth = 1usize;
    for (offset, byte) in source.as_bytes()[after_open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return after_open + offset + 1;
                }
            }
            _ => {}
        }
    }
    source.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_function_with_nested_braces() {
        let source = "#include <stdio.h>\n\nint add(int a, int b) {\n    if (a) { return a; }\n    return a + b;\n}\n\nstatic void noop(void) {}\n";
        let chunks = c_family(source);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name.as_deref(), Some("add"));
        assert!(chunks[0].content.starts_with("int add("));
        assert!(chunks[0].content.ends_with("return a + b;\n}"));
        assert_eq!(chunks[1].name.as_deref(), Some("noop"));
        assert_eq!(chunks[1].content, "void noop(void) {}");
    }

    #[test]
    fn test_control_flow_is_not_a_function() {
        let source = "void f() {\n  if (x) {\n  } else if (y) {\n  }\n  while (z) {}\n}\n";
        let names: Vec<_> = c_family(source)
            .into_iter()
            .filter_map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["f".to_string()]);
    }

    #[test]
    fn test_cpp_class_detected() {
        let source = "class Widget {\npublic:\n  int size() { return 1; }\n};\n";
        let chunks = c_family(source);
        assert_eq!(chunks[0].kind, ChunkKind::Class);
        assert_eq!(chunks[0].name.as_deref(), Some("Widget"));
        assert!(chunks[0].content.ends_with('}'));
    }

    #[test]
    fn test_unterminated_block_runs_to_eof() {
        let source = "function open(a) {\n  return a;\n";
        let chunks = generic(source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, source);
    }

    #[test]
    fn test_generic_finds_each_function() {
        let source = "function a() { }\nvar x = 1;\nfunction b(p, q) { return p; }\n";
        let names: Vec<_> = generic(source).into_iter().filter_map(|c| c.name).collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
