/// Configuration module for reporag.
///
/// Handles loading, validating, and providing default configuration values.
/// Secrets are never stored in the file; each section names the environment
/// variable that holds its key.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indexer::core::RefreshPolicy;

// ── Default value functions ──────────────────────────────────────────

fn default_supported_extensions() -> Vec<String> {
    ["py", "js", "java"].map(String::from).to_vec()
}

fn default_ignored_dirs() -> Vec<String> {
    [
        ".git",
        "venv",
        "env",
        ".next",
        "build",
        "dist",
        ".vscode",
        "node_modules",
        "__pycache__",
    ]
    .map(String::from)
    .to_vec()
}

fn default_top_k() -> usize {
    10
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism().map_or(2, |n| n.get()) * 2
}

fn default_clone_dir() -> PathBuf {
    PathBuf::from("cloned_repos")
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_clone_timeout_secs() -> u64 {
    300
}

fn default_embedding_base_url() -> String {
    "http://127.0.0.1:8080/v1".to_string()
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-mpnet-base-v2".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_embedding_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}

fn default_db_path() -> String {
    "./vectors.db".to_string()
}

fn default_index_name() -> String {
    "codebase-rag".to_string()
}

fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

fn default_cloud() -> String {
    "aws".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Extensions walked during ingestion, with or without the dot.
    #[serde(default = "default_supported_extensions")]
    pub supported_extensions: Vec<String>,

    /// Directory names never entered, at any depth.
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default)]
    pub refresh_policy: RefreshPolicy,

    #[serde(default = "default_clone_dir")]
    pub clone_dir: PathBuf,

    /// Directory that local-path references must resolve inside. Local paths
    /// are refused when unset; clone URLs are always accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,

    /// Bound on each embedding, vector-store and completion call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Http,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embedding_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Pinecone,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub pinecone: PineconeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PineconeConfig {
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Data-plane host. Looked up (and the index created) when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_cloud")]
    pub cloud: String,

    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Origins allowed to call the HTTP API from a browser. Empty allows
    /// none; `"*"` allows any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            supported_extensions: default_supported_extensions(),
            ignored_dirs: default_ignored_dirs(),
            top_k: default_top_k(),
            worker_count: default_worker_count(),
            refresh_policy: RefreshPolicy::default(),
            clone_dir: default_clone_dir(),
            local_root: None,
            request_timeout_secs: default_request_timeout_secs(),
            clone_timeout_secs: default_clone_timeout_secs(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            base_url: default_embedding_base_url(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            api_key_env: default_embedding_key_env(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: default_db_path(),
            pinecone: PineconeConfig::default(),
        }
    }
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            host: None,
            api_key_env: default_pinecone_key_env(),
            cloud: default_cloud(),
            region: default_region(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_llm_key_env(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        // Check if config file exists
        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        // Parse with defaults
        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.top_k > 0, "top_k must be positive");
        anyhow::ensure!(self.worker_count > 0, "worker_count must be positive");
        anyhow::ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.clone_timeout_secs > 0,
            "clone_timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.supported_extensions
                .iter()
                .any(|e| !e.trim().trim_start_matches('.').is_empty()),
            "at least one supported extension must be specified"
        );
        anyhow::ensure!(
            self.server.bind.parse::<std::net::SocketAddr>().is_ok(),
            "server.bind is not a socket address: {}",
            self.server.bind
        );
        for origin in &self.server.cors_origins {
            anyhow::ensure!(
                origin == "*" || axum::http::HeaderValue::from_str(origin).is_ok(),
                "server.cors_origins entry is not a valid origin: {origin}"
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

/// Value of the environment variable `name`, if set and non-empty.
#[must_use]
pub fn secret_from_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ── Tests ────────────────────────────────────────────────────────────
