//! Repository identity and fetching.
//!
//! A repository is named by the last path segment of its reference
//! (`https://github.com/pallets/flask.git` → `flask.git`) and indexed under
//! the part of that name before the first dot (`flask`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::RagError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub reference: String,
    pub repo_name: String,
    pub namespace: String,
}

impl Repository {
    /// Derive identity from a clone URL, local path or bare name.
    pub fn parse(reference: &str) -> Result<Self, RagError> {
        let reference = reference.trim();
        let repo_name = repo_name_of(reference)
            .ok_or_else(|| RagError::client("Repo URL not provided"))?
            .to_string();
        let namespace = namespace_of(&repo_name).to_string();
        if namespace.is_empty() {
            return Err(RagError::client(format!(
                "Cannot derive a namespace from repository name {repo_name}"
            )));
        }
        Ok(Self {
            reference: reference.to_string(),
            repo_name,
            namespace,
        })
    }

    /// Whether the reference must be cloned rather than read in place.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        is_remote_reference(&self.reference)
    }
}

/// Last non-empty `/`-separated segment.
#[must_use]
pub fn repo_name_of(reference: &str) -> Option<&str> {
    reference
        .trim()
        .split('/')
        .rev()
        .find(|segment| !segment.is_empty())
}

/// `repo_name` up to its first `.`.
#[must_use]
pub fn namespace_of(repo_name: &str) -> &str {
    repo_name.split('.').next().unwrap_or_default()
}

#[must_use]
pub fn is_remote_reference(reference: &str) -> bool {
    reference.contains("://") || reference.starts_with("git@")
}

/// Shallow-clones repositories into a working directory with the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    clone_dir: PathBuf,
    timeout: Duration,
}

impl GitFetcher {
    pub fn new(clone_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            clone_dir: clone_dir.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn target_for(&self, repo: &Repository) -> PathBuf {
        self.clone_dir.join(&repo.repo_name)
    }

    /// Clone `repo` unless its target directory already exists. Returns the
    /// working-tree path.
    pub async fn fetch(&self, repo: &Repository) -> anyhow::Result<PathBuf> {
        let target = self.target_for(repo);
        if target.exists() {
            info!(repo = %repo.repo_name, "Repository already cloned, skipping clone");
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.clone_dir)
            .await
            .with_context(|| format!("cannot create {}", self.clone_dir.display()))?;

        info!(repo = %repo.repo_name, url = %repo.reference, "Cloning repository");
        let child = Command::new("git")
            .args(["clone", "--depth", "1", "--quiet", "--"])
            .arg(&repo.reference)
            .arg(&target)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.context("failed to run git")?,
            Err(_) => {
                remove_partial(&target).await;
                return Err(anyhow!(
                    "git clone timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        if !output.status.success() {
            remove_partial(&target).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git clone failed ({}): {}", output.status, stderr.trim()));
        }

        Ok(target)
    }
}

async fn remove_partial(target: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(target).await {
        debug!("no partial clone to remove at {}: {e}", target.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clone_url() {
        let repo = Repository::parse("https://github.com/pallets/flask.git").unwrap();
        assert_eq!(repo.repo_name, "flask.git");
        assert_eq!(repo.namespace, "flask");
        assert!(repo.is_remote());
    }

    #[test]
    fn test_parse_trailing_slash_and_dots() {
        let repo = Repository::parse("https://example.com/org/foo.bar.git/").unwrap();
        assert_eq!(repo.repo_name, "foo.bar.git");
        assert_eq!(repo.namespace, "foo");
    }

    #[test]
    fn test_parse_bare_name_and_local_path() {
        let repo = Repository::parse("flask").unwrap();
        assert_eq!(repo.namespace, "flask");
        assert!(!repo.is_remote());

        let local = Repository::parse("/tmp/work/demo").unwrap();
        assert_eq!(local.repo_name, "demo");
        assert!(!local.is_remote());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(Repository::parse("").unwrap_err().is_client_error());
        assert!(Repository::parse("  / ").unwrap_err().is_client_error());
        assert!(Repository::parse("https://x.org/.dotfiles").unwrap_err().is_client_error());
    }

    #[test]
    fn test_ssh_reference_is_remote() {
        let repo = Repository::parse("git@github.com:pallets/flask.git").unwrap();
        assert_eq!(repo.repo_name, "flask.git");
        assert!(repo.is_remote());
    }

    #[tokio::test]
    async fn test_existing_target_skips_clone() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = GitFetcher::new(dir.path(), Duration::from_secs(5));
        let repo = Repository::parse("https://invalid.invalid/none/demo.git").unwrap();
        std::fs::create_dir_all(fetcher.target_for(&repo)).unwrap();
        let path = fetcher.fetch(&repo).await.unwrap();
        assert_eq!(path, dir.path().join("demo.git"));
    }
}
