//! HTTP surface for the ingestion and query entry points.
//!
//! | Method | Path | Body | Success |
//! |--------|------|------|---------|
//! | `POST` | `/embed` | `{"repo_url": "..."}` | ingestion report + `message` |
//! | `POST` | `/chat` | `{"query", "repo", "chat_history"}` | `{"answer": "..."}` |
//! | `GET`  | `/health` | | `{"status": "ok", "version"}` |
//!
//! Errors are `{"error": "..."}` with 400 for missing input and 500 for
//! everything else. Upstream causes are logged, never returned.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::RagError;
use crate::indexer::core::IngestionReport;
use crate::repo::Repository;
use crate::service::{QueryRequest, RagService};

#[derive(Debug, Default, Deserialize)]
pub struct EmbedRequest {
    #[serde(default)]
    pub repo_url: Option<String>,
}

#[derive(Serialize)]
struct EmbedResponse {
    message: String,
    #[serde(flatten)]
    report: IngestionReport,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

/// Error that converts into a JSON HTTP response.
struct AppError {
    status: StatusCode,
    body: serde_json::Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn status_of(err: &RagError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        Self {
            status: status_of(&err),
            body: serde_json::json!({ "error": err.public_message() }),
        }
    }
}

/// Browsers may call the API only from `origins`; `"*"` allows any.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| {
            HeaderValue::from_str(o)
                .inspect_err(|_| warn!(origin = %o, "Ignoring invalid CORS origin"))
                .ok()
        }))
    };
    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn router(service: Arc<RagService>, cors_origins: &[String]) -> Router {
    let cors = cors_layer(cors_origins);

    Router::new()
        .route("/embed", post(handle_embed))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

/// Serve until `shutdown` resolves, then cancel in-flight ingestions.
pub async fn serve(
    service: Arc<RagService>,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("HTTP server listening on http://{}", listener.local_addr()?);

    let token = service.shutdown_token();
    axum::serve(listener, router(service, &config.cors_origins))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutting down, cancelling in-flight ingestion");
            token.cancel();
        })
        .await?;
    Ok(())
}

async fn handle_embed(
    State(service): State<Arc<RagService>>,
    payload: Option<Json<EmbedRequest>>,
) -> Result<Json<EmbedResponse>, AppError> {
    let Json(req) = payload.unwrap_or_default();
    let reference = req.repo_url.unwrap_or_default();
    if reference.trim().is_empty() {
        return Err(RagError::client("Repo URL not provided").into());
    }

    match service.ingest(&reference).await {
        Ok(report) => Ok(Json(EmbedResponse {
            message: report.message(),
            report,
        })),
        Err(err) => {
            let mut app_err = AppError::from(err);
            if let Ok(repo) = Repository::parse(&reference) {
                if app_err.status != StatusCode::BAD_REQUEST {
                    let failed = IngestionReport::failed(&repo);
                    app_err.body["status"] = serde_json::json!(failed.status);
                    app_err.body["repo_name"] = serde_json::json!(failed.repo_name);
                    app_err.body["namespace"] = serde_json::json!(failed.namespace);
                }
            }
            Err(app_err)
        }
    }
}

async fn handle_chat(
    State(service): State<Arc<RagService>>,
    payload: Option<Json<QueryRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let Json(req) = payload.unwrap_or_default();
    let resp = service.ask(&req).await?;
    Ok(Json(serde_json::json!({ "answer": resp.answer })))
}

async fn handle_health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
