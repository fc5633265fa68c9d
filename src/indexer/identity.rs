//! Content-addressed chunk identifiers.
//!
//! An id is `"{repo_name}:{file}:{hash10}"` where `hash10` is the first ten
//! hex characters of SHA-256 over the chunk content. Ten hex characters are
//! 40 bits, so two different chunks of the same file collide with
//! probability about n²/2⁴¹; a collision makes the later upsert replace the
//! earlier chunk.

use sha2::{Digest, Sha256};

pub const HASH_PREFIX_LEN: usize = 10;

#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_PREFIX_LEN);
    hex
}

#[must_use]
pub fn chunk_id(repo_name: &str, file_name: &str, content: &str) -> String {
    format!("{repo_name}:{file_name}:{}", content_hash(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_deterministic() {
        let a = chunk_id("demo", "src/a.py", "def add(a, b):\n    return a + b");
        let b = chunk_id("demo", "src/a.py", "def add(a, b):\n    return a + b");
        assert_eq!(a, b);
        assert!(a.starts_with("demo:src/a.py:"));
        assert_eq!(a.len(), "demo:src/a.py:".len() + HASH_PREFIX_LEN);
    }

    #[test]
    fn test_known_digest_prefix() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb924...
        assert_eq!(content_hash(""), "e3b0c44298");
    }

    #[test]
    fn test_content_changes_id() {
        assert_ne!(
            chunk_id("demo", "a.py", "x = 1"),
            chunk_id("demo", "a.py", "x = 2")
        );
        assert_ne!(
            chunk_id("demo", "a.py", "x = 1"),
            chunk_id("demo", "b.py", "x = 1")
        );
    }
}
