//! The two pipeline entry points, shared by the HTTP server, the MCP tools
//! and the CLI.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{Config, EmbeddingProvider, StoreBackend, secret_from_env};
use crate::embedder::Embedder;
use crate::embedder::http::HttpEmbedder;
use crate::embedder::mock::MockEmbedder;
use crate::error::RagError;
use crate::indexer::core::{IngestionReport, Ingestor, RefreshPolicy};
use crate::indexer::walker::WalkFilter;
use crate::indexer::writer::IndexWriter;
use crate::llm::ChatModel;
use crate::llm::openai::OpenAiChat;
use crate::repo::{GitFetcher, Repository, namespace_of, repo_name_of};
use crate::retrieval::{Assistant, ConversationTurn, Retriever};
use crate::store::memory::MemoryStore;
use crate::store::pinecone::{IndexSpec, PineconeStore};
use crate::store::sqlite::SqliteStore;
use crate::store::{StoreStats, VectorStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    /// Repository name or clone URL.
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub chat_history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
}

pub struct RagService {
    store: Arc<dyn VectorStore>,
    fetcher: GitFetcher,
    local_root: Option<PathBuf>,
    ingestor: Ingestor,
    assistant: Assistant,
    shutdown: CancellationToken,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases a namespace claimed for ingestion when dropped.
#[derive(Debug)]
struct Claim<'a> {
    set: &'a Mutex<HashSet<String>>,
    namespace: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.namespace);
        }
    }
}

impl RagService {
    /// Wire the pipeline around already-built collaborators.
    pub fn new(
        config: &Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let timeout = config.request_timeout();
        let writer = IndexWriter::new(embedder.clone(), store.clone(), timeout);
        let ingestor = Ingestor::new(
            store.clone(),
            writer,
            WalkFilter::new(&config.supported_extensions, &config.ignored_dirs),
            config.worker_count,
            config.refresh_policy,
            timeout,
        );
        let retriever = Retriever::new(embedder, store.clone(), config.top_k, timeout);
        Self {
            store,
            fetcher: GitFetcher::new(config.clone_dir.clone(), config.clone_timeout()),
            local_root: config.local_root.clone(),
            ingestor,
            assistant: Assistant::new(retriever, model, timeout),
            shutdown: CancellationToken::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Build every collaborator from configuration.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .timeout(config.request_timeout())
            .user_agent(concat!("reporag/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let embedding = &config.embedding;
        let embedder: Arc<dyn Embedder> = match embedding.provider {
            EmbeddingProvider::Http => Arc::new(HttpEmbedder::new(
                client.clone(),
                secret_from_env(&embedding.api_key_env),
                embedding.base_url.clone(),
                embedding.model.clone(),
                embedding.dimensions,
            )),
            EmbeddingProvider::Mock => Arc::new(MockEmbedder::new(embedding.dimensions)),
        };

        let store: Arc<dyn VectorStore> = match config.store.backend {
            StoreBackend::Sqlite => Arc::new(
                SqliteStore::open(&config.store.db_path, embedding.dimensions)
                    .context("Failed to open vector store")?,
            ),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Pinecone => {
                let pc = &config.store.pinecone;
                let api_key = secret_from_env(&pc.api_key_env)
                    .with_context(|| format!("{} is not set", pc.api_key_env))?;
                let store = match &pc.host {
                    Some(host) => PineconeStore::new(client.clone(), api_key, host),
                    None => {
                        let spec = IndexSpec {
                            name: pc.index_name.clone(),
                            dimension: embedding.dimensions,
                            cloud: pc.cloud.clone(),
                            region: pc.region.clone(),
                        };
                        PineconeStore::connect(client.clone(), api_key, &spec)
                            .await
                            .context("Failed to connect to Pinecone")?
                    }
                };
                Arc::new(store)
            }
        };

        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(
            client,
            secret_from_env(&config.llm.api_key_env),
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            config.llm.max_tokens,
        ));

        Ok(Self::new(config, store, embedder, model))
    }

    /// Token cancelled on shutdown; every ingestion runs under a child of it.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Ingest a repository given by clone URL or local directory.
    pub async fn ingest(&self, reference: &str) -> Result<IngestionReport, RagError> {
        let repo = Repository::parse(reference)?;
        let local = if repo.is_remote() {
            None
        } else {
            Some(self.resolve_local(&repo)?)
        };
        let _claim = self.claim(&repo.namespace)?;

        // Checked before cloning so a processed repository costs no network.
        if self.ingestor.refresh_policy() == RefreshPolicy::SkipExisting
            && self.ingestor.is_indexed(&repo).await?
        {
            info!(repo = %repo.repo_name, "Repo already processed, skipping");
            return Ok(IngestionReport::already_processed(&repo));
        }

        let root = match local {
            Some(path) => path,
            None => self.fetcher.fetch(&repo).await.map_err(|e| {
                error!(repo = %repo.repo_name, "Failed to clone repository: {e:#}");
                RagError::upstream(format!("Failed to embed repository {}", repo.repo_name), e)
            })?,
        };

        let cancel = self.shutdown.child_token();
        self.ingestor
            .ingest(&root, &repo, &cancel)
            .await
            .inspect_err(|e| error!(repo = %repo.repo_name, "Ingestion failed: {e}"))
    }

    /// Answer a question about an ingested repository.
    pub async fn ask(&self, request: &QueryRequest) -> Result<QueryResponse, RagError> {
        let namespace = repo_name_of(&request.repo).map(namespace_of).unwrap_or_default();
        if request.query.trim().is_empty() || namespace.is_empty() {
            return Err(RagError::client("Query or repo not provided"));
        }

        let answer = self
            .assistant
            .answer(&request.query, namespace, &request.chat_history)
            .await?;
        Ok(QueryResponse { answer })
    }

    /// Namespaces in the store with their vector counts.
    pub async fn namespaces(&self) -> Result<StoreStats, RagError> {
        self.store.describe().await.map_err(|e| {
            error!("Failed to describe vector store: {e}");
            RagError::upstream("Failed to list repositories", e)
        })
    }

    /// Resolve a local reference against `local_root`, relative references
    /// included. Anything that resolves outside the root is refused.
    fn resolve_local(&self, repo: &Repository) -> Result<PathBuf, RagError> {
        let Some(configured) = &self.local_root else {
            return Err(RagError::client("Local repository paths are not enabled"));
        };
        let root = configured.canonicalize().map_err(|e| {
            error!(root = %configured.display(), "Local root is not readable: {e}");
            RagError::upstream(format!("Failed to embed repository {}", repo.repo_name), e)
        })?;
        let candidate = root.join(&repo.reference);

        let inside = |path: &Path| {
            (path.starts_with(&root) || path.starts_with(configured))
                && !path.components().any(|c| matches!(c, Component::ParentDir))
        };
        match candidate.canonicalize() {
            Ok(path) if path.starts_with(&root) => Ok(path),
            // missing roots are reported by the ingestor
            Err(_) if inside(&candidate) => Ok(candidate),
            _ => {
                info!(reference = %repo.reference, "Refusing local path outside the local root");
                Err(RagError::client(
                    "Repository path is outside the allowed local root",
                ))
            }
        }
    }

    fn claim(&self, namespace: &str) -> Result<Claim<'_>, RagError> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| RagError::upstream("Ingestion unavailable", anyhow::anyhow!("lock poisoned")))?;
        if !set.insert(namespace.to_string()) {
            return Err(RagError::client(format!(
                "Repository {namespace} is already being embedded"
            )));
        }
        Ok(Claim {
            set: &self.in_flight,
            namespace: namespace.to_string(),
        })
    }
}
