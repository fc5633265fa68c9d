//! # reporag - repository RAG service
//!
//! Clones or reads a source repository, splits every supported file into
//! structural chunks, embeds them under a per-repository namespace and
//! answers natural-language questions about the code.
//!
//! ## Architecture
//!
//! - **[`config`]**: configuration loading and validation
//! - **[`repo`]**: repository references, namespaces and shallow clones
//! - **[`indexer`]**: file walking, tree-sitter chunking, content-addressed IDs, worker pool
//! - **[`embedder`]**: OpenAI-compatible and deterministic embedders
//! - **[`store`]**: vector stores (SQLite + sqlite-vec, Pinecone, in-memory)
//! - **[`retrieval`]**: top-k retrieval and prompt assembly
//! - **[`llm`]**: chat-completion client
//! - **[`service`]**: the ingestion and query entry points
//! - **[`server`]** / **[`mcp`]**: HTTP and MCP surfaces

pub mod config;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod mcp;
pub mod repo;
pub mod retrieval;
pub mod server;
pub mod service;
pub mod store;
