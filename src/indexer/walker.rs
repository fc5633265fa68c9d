use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::Serialize;

use super::core::{FailureStage, ItemFailure};
use super::languages::normalize_extension;

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Root-relative, always `/`-separated.
    pub rel_path: String,
    /// Lowercase, without the leading dot.
    pub extension: String,
}

#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<SourceFile>,
    pub failures: Vec<ItemFailure>,
}

/// Which files a walk keeps.
#[derive(Debug, Clone)]
pub struct WalkFilter {
    extensions: HashSet<String>,
    ignored_dirs: HashSet<String>,
}

impl WalkFilter {
    pub fn new<E, D>(extensions: E, ignored_dirs: D) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
            ignored_dirs: ignored_dirs
                .into_iter()
                .map(|d| d.as_ref().to_string())
                .collect(),
        }
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions.contains(&normalize_extension(ext))
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dirs.contains(name)
    }
}

/// Collect every file under `root` with a supported extension, never entering
/// an ignored directory at any depth.
///
/// Fails only when `root` itself cannot be listed. Entries that cannot be
/// read further down are returned as `read` failures.
pub fn walk(root: &Path, filter: &WalkFilter) -> std::io::Result<WalkOutcome> {
    std::fs::read_dir(root)?;

    let prune = filter.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && prune.is_ignored_dir(&entry.file_name().to_string_lossy()))
        })
        .build();

    let mut outcome = WalkOutcome::default();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                let file = error_path(&err)
                    .map(|p| relative_path(root, p))
                    .unwrap_or_default();
                tracing::warn!(file = %file, "skipping unreadable entry: {err}");
                outcome.failures.push(ItemFailure {
                    file,
                    stage: FailureStage::Read,
                    chunk_id: None,
                    message: err.to_string(),
                });
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        if !filter.accepts_extension(ext) {
            continue;
        }

        outcome.files.push(SourceFile {
            path: path.to_path_buf(),
            rel_path: relative_path(root, path),
            extension: normalize_extension(ext),
        });
    }

    outcome.files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(outcome)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn filter() -> WalkFilter {
        WalkFilter::new(
            [".py", "js", "JAVA"],
            [".git", "node_modules", "venv", "__pycache__"],
        )
    }

    #[test]
    fn test_walk_selects_supported_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/pkg")).unwrap();
        fs::write(root.join("src/pkg/a.py"), "x = 1").unwrap();
        fs::write(root.join("src/b.JS"), "let y = 2;").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();
        fs::write(root.join("Main.java"), "class Main {}").unwrap();

        let outcome = walk(root, &filter()).unwrap();
        let rels: Vec<_> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["Main.java", "src/b.JS", "src/pkg/a.py"]);
        assert_eq!(outcome.files[1].extension, "js");
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_walk_prunes_ignored_dirs_at_any_depth() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/lib")).unwrap();
        fs::create_dir_all(root.join("web/node_modules/dep")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("node_modules/lib/index.js"), "x").unwrap();
        fs::write(root.join("web/node_modules/dep/index.js"), "x").unwrap();
        fs::write(root.join(".git/hook.py"), "x").unwrap();
        fs::write(root.join("web/app.js"), "x").unwrap();

        let outcome = walk(root, &filter()).unwrap();
        let rels: Vec<_> = outcome.files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["web/app.js"]);
    }

    #[test]
    fn test_walk_includes_hidden_non_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".github/scripts")).unwrap();
        fs::write(root.join(".github/scripts/release.py"), "x").unwrap();
        fs::write(root.join(".gitignore"), "*.py\n").unwrap();

        let outcome = walk(root, &filter()).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].rel_path, ".github/scripts/release.py");
    }

    #[test]
    fn test_walk_missing_root_is_error() {
        let dir = tempdir().unwrap();
        assert!(walk(&dir.path().join("nope"), &filter()).is_err());
    }
}
