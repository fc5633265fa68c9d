//! Crate-level error taxonomy for the ingestion and query entry points.
//!
//! Module-local failures (`ChunkError`, `StoreError`, `EmbedderError`, ...)
//! are converted into one of these variants at the entry-point boundary.
//! Per-file and per-chunk failures never show up here: they are aggregated
//! into the [`IngestionReport`](crate::indexer::core::IngestionReport).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    /// Missing or malformed input (query, repo, URL). Reported verbatim.
    #[error("{0}")]
    ClientInput(String),

    /// A clone, embedding, vector-store or completion call failed.
    ///
    /// `public` is what the caller sees; `source` is for operator logs only.
    #[error("{public}: {source:#}")]
    Upstream {
        public: String,
        #[source]
        source: anyhow::Error,
    },

    /// The repository root could not be read at all.
    #[error("cannot read repository {repo}: {source}")]
    FatalIngestion {
        repo: String,
        #[source]
        source: std::io::Error,
    },
}

impl RagError {
    pub fn client(msg: impl Into<String>) -> Self {
        Self::ClientInput(msg.into())
    }

    pub fn upstream(public: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            public: public.into(),
            source: source.into(),
        }
    }

    /// Message that is safe to return to a caller. Never includes the cause
    /// of an upstream failure.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::ClientInput(msg) => msg.clone(),
            Self::Upstream { public, .. } => public.clone(),
            Self::FatalIngestion { repo, .. } => format!("Failed to embed repository {repo}"),
        }
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ClientInput(_))
    }
}
