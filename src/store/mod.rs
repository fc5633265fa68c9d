//! Namespaced vector storage.
//!
//! The [`VectorStore`] trait is the only thing the pipeline knows about the
//! index. Every record lives in exactly one namespace (one per repository);
//! upserting an id that already exists in that namespace replaces it.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`sqlite::SqliteStore`] | Local, durable (rusqlite + sqlite-vec) |
//! | [`pinecone::PineconeStore`] | Hosted index over REST |
//! | [`memory::MemoryStore`] | In-process, brute-force cosine |

pub mod memory;
pub mod pinecone;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload stored next to each vector, returned verbatim on query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub repo: String,
    pub file: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub vector_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// `None` until the first vector fixes the dimension.
    pub dimension: Option<usize>,
    pub namespaces: BTreeMap<String, NamespaceStats>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("request to vector service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Config(String),
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Index-wide statistics, including per-namespace vector counts.
    async fn describe(&self) -> Result<StoreStats, StoreError>;

    /// Names of all non-empty namespaces.
    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.describe().await?.namespaces.into_keys().collect())
    }

    /// Insert or replace one record. A single call is atomic.
    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<(), StoreError>;

    /// Up to `top_k` nearest records, highest score first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}
