//! # reporag CLI
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reporag ingest <repo>` | Embed a repository (clone URL or local path) |
//! | `reporag ask --repo <repo> "<question>"` | Answer a question about an embedded repository |
//! | `reporag namespaces` | List embedded repositories |
//! | `reporag serve` | Start the HTTP server |
//! | `reporag mcp` | Start the MCP server on stdio |
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default); command
//! output is JSON on stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reporag::config::Config;
use reporag::mcp::server::{McpContext, McpServer};
use reporag::repo::is_remote_reference;
use reporag::server;
use reporag::service::{QueryRequest, RagService};

#[derive(Parser)]
#[command(
    name = "reporag",
    version,
    about = "Embed source repositories and ask questions about the code"
)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store a repository. Already-embedded repositories are skipped.
    Ingest {
        /// Git clone URL or local directory.
        reference: String,
    },

    /// Ask a question about an embedded repository.
    Ask {
        /// Repository name or clone URL used when embedding.
        #[arg(long)]
        repo: String,

        query: String,
    },

    /// List embedded repositories and their chunk counts.
    Namespaces,

    /// Start the HTTP server (POST /embed, POST /chat).
    Serve {
        /// Overrides `server.bind` from the configuration.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Start the MCP server on stdio.
    Mcp,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries command output and the MCP protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    // The operator named this directory, so it may be read even without a local root.
    if let Command::Ingest { reference } = &cli.command {
        if config.local_root.is_none() && !is_remote_reference(reference) {
            config.local_root = Path::new(reference)
                .canonicalize()
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf));
        }
    }

    let service = Arc::new(
        RagService::from_config(&config)
            .await
            .context("failed to initialise pipeline")?,
    );

    match cli.command {
        Command::Ingest { reference } => {
            let ingest = service.ingest(&reference);
            tokio::pin!(ingest);
            let report = tokio::select! {
                report = &mut ingest => report,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, cancelling ingestion");
                    service.shutdown();
                    ingest.await
                }
            }?;
            info!("{}", report.message());
            print_json(&report)?;
        }
        Command::Ask { repo, query } => {
            let request = QueryRequest {
                query,
                repo,
                chat_history: Vec::new(),
            };
            let response = service.ask(&request).await?;
            print_json(&response)?;
        }
        Command::Namespaces => {
            let stats = service.namespaces().await?;
            print_json(&stats)?;
        }
        Command::Serve { bind } => {
            let mut server_config = config.server.clone();
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            server::serve(service, &server_config, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
        Command::Mcp => {
            info!("Starting reporag MCP server...");
            McpServer::new(McpContext { service }).start().await?;
        }
    }

    Ok(())
}
