//! Turns one located chunk into one stored vector.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::code_parser::CodeChunk;
use super::identity::chunk_id;
use super::walker::SourceFile;
use crate::embedder::{Embedder, EmbedderError};
use crate::store::{ChunkMetadata, StoreError, VectorRecord, VectorStore};

/// A chunk together with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct LocatedChunk {
    pub repo: String,
    pub source_file: SourceFile,
    pub chunk: CodeChunk,
}

impl LocatedChunk {
    #[must_use]
    pub fn id(&self) -> String {
        chunk_id(&self.repo, &self.source_file.rel_path, &self.chunk.content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub namespace: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedderError),

    #[error("embedding returned an empty vector")]
    EmptyVector,

    #[error("embedding returned a zero-norm vector")]
    ZeroVector,

    #[error("upsert failed: {0}")]
    Upsert(#[from] StoreError),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

impl WriteError {
    /// Whether the failure happened before anything was sent to the store.
    #[must_use]
    pub fn is_embed_stage(&self) -> bool {
        matches!(
            self,
            Self::Embed(_)
                | Self::EmptyVector
                | Self::ZeroVector
                | Self::Timeout { stage: "embed", .. }
        )
    }
}

#[derive(Clone)]
pub struct IndexWriter {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    call_timeout: Duration,
}

impl IndexWriter {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            call_timeout,
        }
    }

    /// Embed the chunk's raw content and upsert it under `namespace`.
    ///
    /// Re-indexing identical content yields the same id, so the store record
    /// is replaced rather than duplicated.
    pub async fn index(
        &self,
        located: &LocatedChunk,
        namespace: &str,
    ) -> Result<IndexedChunk, WriteError> {
        let vector = tokio::time::timeout(
            self.call_timeout,
            self.embedder.embed(&located.chunk.content),
        )
        .await
        .map_err(|_| WriteError::Timeout {
            stage: "embed",
            secs: self.call_timeout.as_secs(),
        })??;

        if vector.is_empty() {
            return Err(WriteError::EmptyVector);
        }
        // cosine distance is undefined against it
        if vector.iter().all(|v| *v == 0.0) {
            return Err(WriteError::ZeroVector);
        }

        let indexed = IndexedChunk {
            id: located.id(),
            namespace: namespace.to_string(),
            vector,
            metadata: ChunkMetadata {
                repo: located.repo.clone(),
                file: located.source_file.rel_path.clone(),
                content: located.chunk.content.clone(),
            },
        };

        let record = VectorRecord {
            id: indexed.id.clone(),
            values: indexed.vector.clone(),
            metadata: indexed.metadata.clone(),
        };
        tokio::time::timeout(self.call_timeout, self.store.upsert(record, namespace))
            .await
            .map_err(|_| WriteError::Timeout {
                stage: "upsert",
                secs: self.call_timeout.as_secs(),
            })??;

        tracing::debug!(id = %indexed.id, namespace, "Upserted chunk");
        Ok(indexed)
    }
}
