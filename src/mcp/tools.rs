/// MCP Tool handlers for reporag.
///
/// 1. embed_repository  – clone (or read) a repository and index it
/// 2. ask_repository    – answer a question from an indexed repository
/// 3. list_repositories – namespaces in the vector store
use crate::error::RagError;
use crate::mcp::server::McpContext;
use crate::retrieval::ConversationTurn;
use crate::service::QueryRequest;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct EmbedParams {
    /// Git clone URL or local directory of the repository
    repo_url: String,
}

#[derive(Deserialize, JsonSchema)]
struct AskParams {
    /// Question about the code (natural language)
    query: String,
    /// Repository name or clone URL used when embedding
    repo: String,
    /// Earlier turns of the conversation, oldest first
    chat_history: Option<Vec<ConversationTurn>>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(err: &RagError) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(
        err.public_message(),
    )]))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Embed a repository's source code into the vector store. Accepts a git clone URL or a local directory. Repositories that are already embedded are skipped."
    )]
    async fn embed_repository(
        &self,
        params: Parameters<EmbedParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.ctx.service.ingest(&params.0.repo_url).await {
            Ok(report) => {
                let mut body = serde_json::to_value(&report)
                    .map_err(|e| McpError::internal_error(format!("serialize failed: {e}"), None))?;
                body["message"] = serde_json::json!(report.message());
                json_result(body)
            }
            Err(e) => error_result(&e),
        }
    }

    #[tool(
        description = "Ask a question about an embedded repository. The most relevant code chunks are retrieved and passed to the language model together with the chat history."
    )]
    async fn ask_repository(&self, params: Parameters<AskParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let request = QueryRequest {
            query: p.query,
            repo: p.repo,
            chat_history: p.chat_history.unwrap_or_default(),
        };
        match self.ctx.service.ask(&request).await {
            Ok(resp) => json_result(serde_json::json!({ "answer": resp.answer })),
            Err(e) => error_result(&e),
        }
    }

    #[tool(description = "List embedded repositories (vector-store namespaces) with their chunk counts")]
    async fn list_repositories(&self) -> Result<CallToolResult, McpError> {
        match self.ctx.service.namespaces().await {
            Ok(stats) => {
                let repositories: Vec<serde_json::Value> = stats
                    .namespaces
                    .iter()
                    .map(|(name, ns)| {
                        serde_json::json!({
                            "namespace": name,
                            "chunks": ns.vector_count,
                        })
                    })
                    .collect();
                json_result(serde_json::json!({
                    "repositories": repositories,
                    "dimension": stats.dimension,
                }))
            }
            Err(e) => error_result(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedder::mock::MockEmbedder;
    use crate::llm::{ChatModel, LlmError, Message};
    use crate::service::RagService;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Silent;

    #[async_trait]
    impl ChatModel for Silent {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Ok("ok".into())
        }
    }

    fn tools() -> AppTools {
        let service = RagService::new(
            &Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(MockEmbedder::new(8)),
            Arc::new(Silent),
        );
        AppTools::new(McpContext {
            service: Arc::new(service),
        })
    }

    #[test]
    fn test_tools_registered() {
        let names: Vec<String> = tools()
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        for expected in ["embed_repository", "ask_repository", "list_repositories"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[tokio::test]
    async fn test_ask_without_query_is_tool_error() {
        let result = tools()
            .ask_repository(Parameters(AskParams {
                query: String::new(),
                repo: "demo".into(),
                chat_history: None,
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
