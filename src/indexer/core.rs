use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::code_parser::try_chunk;
use super::walker::{SourceFile, WalkFilter, walk};
use super::writer::{IndexWriter, LocatedChunk};
use crate::error::RagError;
use crate::repo::Repository;
use crate::store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    AlreadyProcessed,
    Embedded,
    Failed,
}

/// What to do when the repository's namespace already holds vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Report `already_processed` and write nothing.
    #[default]
    SkipExisting,
    /// Walk and upsert again. Unchanged chunks keep their ids and are
    /// replaced in place; chunks whose content disappeared stay in the index.
    Reingest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Parse,
    Embed,
    Upsert,
    Task,
}

/// One file or chunk that could not be indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub file: String,
    pub stage: FailureStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub status: IngestStatus,
    pub repo_name: String,
    pub namespace: String,
    pub files_scanned: usize,
    pub files_processed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl IngestionReport {
    fn empty(repo: &Repository, status: IngestStatus) -> Self {
        Self {
            status,
            repo_name: repo.repo_name.clone(),
            namespace: repo.namespace.clone(),
            files_scanned: 0,
            files_processed: 0,
            chunks_indexed: 0,
            failures: Vec::new(),
            cancelled: false,
            duration_ms: 0,
            finished_at: Utc::now(),
        }
    }

    /// Report for a repository whose namespace is already populated.
    #[must_use]
    pub fn already_processed(repo: &Repository) -> Self {
        Self::empty(repo, IngestStatus::AlreadyProcessed)
    }

    /// Report for an ingestion that was aborted by a fatal error.
    #[must_use]
    pub fn failed(repo: &Repository) -> Self {
        Self::empty(repo, IngestStatus::Failed)
    }

    /// Human-readable one-liner for the caller.
    #[must_use]
    pub fn message(&self) -> String {
        match self.status {
            IngestStatus::AlreadyProcessed => format!("Repo {} already processed!", self.repo_name),
            IngestStatus::Embedded if self.cancelled => {
                format!("Embedding of repo {} was cancelled", self.repo_name)
            }
            IngestStatus::Embedded if self.files_scanned == 0 => {
                format!("Repo {} has no supported source files", self.repo_name)
            }
            IngestStatus::Embedded if !self.failures.is_empty() => format!(
                "Repo {} embedded with {} failures",
                self.repo_name,
                self.failures.len()
            ),
            IngestStatus::Embedded => format!("Repo {} embedded successfully!", self.repo_name),
            IngestStatus::Failed => format!("Failed to embed repository {}", self.repo_name),
        }
    }
}

#[derive(Debug, Default)]
struct FileOutcome {
    processed: bool,
    chunks_indexed: usize,
    failures: Vec<ItemFailure>,
}

/// Walks a repository and indexes every chunk of every supported file.
pub struct Ingestor {
    store: Arc<dyn VectorStore>,
    writer: IndexWriter,
    filter: WalkFilter,
    worker_count: usize,
    refresh: RefreshPolicy,
    call_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn VectorStore>,
        writer: IndexWriter,
        filter: WalkFilter,
        worker_count: usize,
        refresh: RefreshPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            writer,
            filter,
            worker_count: worker_count.max(1),
            refresh,
            call_timeout,
        }
    }

    /// Whether the repository's namespace already holds vectors.
    pub async fn is_indexed(&self, repo: &Repository) -> Result<bool, RagError> {
        let namespaces = tokio::time::timeout(self.call_timeout, self.store.list_namespaces())
            .await
            .map_err(|_| {
                RagError::upstream(
                    format!("Failed to embed repository {}", repo.repo_name),
                    anyhow::anyhow!("listing namespaces timed out"),
                )
            })?
            .map_err(|e| {
                RagError::upstream(format!("Failed to embed repository {}", repo.repo_name), e)
            })?;
        Ok(namespaces.iter().any(|ns| *ns == repo.namespace))
    }

    #[must_use]
    pub fn refresh_policy(&self) -> RefreshPolicy {
        self.refresh
    }

    /// Index the working tree at `root` into `repo.namespace`.
    ///
    /// Per-file and per-chunk failures are collected in the report. Only an
    /// unreadable root or an unreachable store aborts. After `cancel` fires no
    /// new file is started and no new chunk is written; writes already in
    /// flight complete.
    pub async fn ingest(
        &self,
        root: &Path,
        repo: &Repository,
        cancel: &CancellationToken,
    ) -> Result<IngestionReport, RagError> {
        let started = Instant::now();

        if self.refresh == RefreshPolicy::SkipExisting && self.is_indexed(repo).await? {
            info!(namespace = %repo.namespace, "Namespace already exists. Skipping embedding.");
            return Ok(IngestionReport::already_processed(repo));
        }

        let walk_root = root.to_path_buf();
        let filter = self.filter.clone();
        let walked = tokio::task::spawn_blocking(move || walk(&walk_root, &filter))
            .await
            .map_err(|e| {
                RagError::upstream(format!("Failed to embed repository {}", repo.repo_name), e)
            })?
            .map_err(|source| RagError::FatalIngestion {
                repo: repo.repo_name.clone(),
                source,
            })?;

        let mut report = IngestionReport::empty(repo, IngestStatus::Embedded);
        report.files_scanned = walked.files.len();
        report.failures = walked.failures;
        info!(
            repo = %repo.repo_name,
            files = report.files_scanned,
            workers = self.worker_count,
            "Embedding repository"
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut tasks = JoinSet::new();

        for file in walked.files {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let writer = self.writer.clone();
            let repo_name = repo.repo_name.clone();
            let namespace = repo.namespace.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = index_file(&writer, file, repo_name, &namespace, &cancel).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.files_processed += usize::from(outcome.processed);
                    report.chunks_indexed += outcome.chunks_indexed;
                    report.failures.extend(outcome.failures);
                }
                Err(e) => {
                    warn!("file task failed: {e}");
                    report.failures.push(ItemFailure {
                        file: String::new(),
                        stage: FailureStage::Task,
                        chunk_id: None,
                        message: e.to_string(),
                    });
                }
            }
        }

        report.cancelled = cancel.is_cancelled();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        report.finished_at = Utc::now();

        info!(
            repo = %report.repo_name,
            namespace = %report.namespace,
            files = report.files_processed,
            chunks = report.chunks_indexed,
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "Repository embedding finished"
        );
        Ok(report)
    }
}

async fn index_file(
    writer: &IndexWriter,
    file: SourceFile,
    repo_name: String,
    namespace: &str,
    cancel: &CancellationToken,
) -> FileOutcome {
    let mut outcome = FileOutcome::default();
    let rel_path = file.rel_path.clone();
    let failure = |stage, chunk_id, message: String| ItemFailure {
        file: rel_path.clone(),
        stage,
        chunk_id,
        message,
    };

    let code = match tokio::fs::read(&file.path).await.map(String::from_utf8) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            warn!(file = %file.rel_path, "Skipping file that is not valid UTF-8");
            outcome.failures.push(failure(
                FailureStage::Read,
                None,
                "file is not valid UTF-8".to_string(),
            ));
            return outcome;
        }
        Err(e) => {
            warn!(file = %file.rel_path, "Error reading file: {e}");
            outcome
                .failures
                .push(failure(FailureStage::Read, None, e.to_string()));
            return outcome;
        }
    };

    let ext = file.extension.clone();
    let chunks = match tokio::task::spawn_blocking(move || try_chunk(&code, &ext)).await {
        Ok(Ok(chunks)) => chunks,
        Ok(Err(e)) => {
            warn!(file = %file.rel_path, "Error parsing file: {e}");
            outcome
                .failures
                .push(failure(FailureStage::Parse, None, e.to_string()));
            return outcome;
        }
        Err(e) => {
            outcome
                .failures
                .push(failure(FailureStage::Task, None, e.to_string()));
            return outcome;
        }
    };
    outcome.processed = true;
    debug!(file = %file.rel_path, chunks = chunks.len(), "Chunked file");

    for chunk in chunks {
        if cancel.is_cancelled() {
            break;
        }
        let located = LocatedChunk {
            repo: repo_name.clone(),
            source_file: file.clone(),
            chunk,
        };
        match writer.index(&located, namespace).await {
            Ok(_) => outcome.chunks_indexed += 1,
            Err(e) => {
                let stage = if e.is_embed_stage() {
                    FailureStage::Embed
                } else {
                    FailureStage::Upsert
                };
                warn!(file = %located.source_file.rel_path, "Error indexing chunk: {e}");
                outcome
                    .failures
                    .push(failure(stage, Some(located.id()), e.to_string()));
            }
        }
    }

    outcome
}
