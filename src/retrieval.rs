//! Top-k retrieval and prompt assembly for question answering.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::embedder::{Embedder, EmbedderError};
use crate::error::RagError;
use crate::llm::{ChatModel, LlmError, Message};
use crate::store::{StoreError, VectorStore};

pub const SYSTEM_PROMPT: &str = "You are an expert code reviewer, assisting a user with questions about their codebase. Answer the user as best you can using the given context. Do your best to direct the user to the chunks of code you are referring to in your answers and what files they are located in";

const QUERY_FAILED: &str = "Failed to process the query";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub file: String,
}

/// One prior message of the conversation, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConversationTurn {
    /// "You" (or "user") for the person asking; anything else is the assistant
    #[serde(alias = "user")]
    pub speaker: String,
    /// Message text
    pub text: String,
}

impl ConversationTurn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }

    /// `"You"` or `"user"` is the person asking; anyone else is the assistant.
    #[must_use]
    pub fn is_user(&self) -> bool {
        let speaker = self.speaker.trim();
        speaker.eq_ignore_ascii_case("you") || speaker.eq_ignore_ascii_case("user")
    }

    fn to_message(&self) -> Message {
        if self.is_user() {
            Message::user(self.text.clone())
        } else {
            Message::assistant(self.text.clone())
        }
    }
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embed(#[from] EmbedderError),

    #[error("vector query failed: {0}")]
    Query(#[from] StoreError),

    #[error("completion failed: {0}")]
    Complete(#[from] LlmError),

    #[error("{stage} timed out")]
    Timeout { stage: &'static str },
}

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    call_timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        top_k: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k,
            call_timeout,
        }
    }

    /// The `top_k` chunks of `namespace` nearest to `query`, in store order.
    /// Matches returned without metadata are dropped.
    pub async fn retrieve(
        &self,
        query: &str,
        namespace: &str,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let vector = tokio::time::timeout(self.call_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| RetrievalError::Timeout { stage: "embed" })??;

        let matches = tokio::time::timeout(
            self.call_timeout,
            self.store.query(&vector, self.top_k, namespace, true),
        )
        .await
        .map_err(|_| RetrievalError::Timeout { stage: "query" })??;

        Ok(matches
            .into_iter()
            .filter_map(|m| {
                let metadata = m.metadata?;
                Some(RetrievedChunk {
                    id: m.id,
                    score: m.score,
                    content: metadata.content,
                    file: metadata.file,
                })
            })
            .collect())
    }
}

/// `content + "\n" + file` per chunk, joined with `"\n"`.
#[must_use]
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("{}\n{}", c.content, c.file))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System prompt, then the context-bearing question, then the prior turns.
#[must_use]
pub fn build_messages(context: &str, query: &str, history: &[ConversationTurn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(SYSTEM_PROMPT));
    messages.push(Message::user(format!(
        "Relevant context:\n{context}\n\nQuestion: {query}"
    )));
    messages.extend(history.iter().map(ConversationTurn::to_message));
    messages
}

/// Answers questions about one indexed repository.
#[derive(Clone)]
pub struct Assistant {
    retriever: Retriever,
    model: Arc<dyn ChatModel>,
    call_timeout: Duration,
}

impl Assistant {
    pub fn new(retriever: Retriever, model: Arc<dyn ChatModel>, call_timeout: Duration) -> Self {
        Self {
            retriever,
            model,
            call_timeout,
        }
    }

    pub async fn answer(
        &self,
        query: &str,
        namespace: &str,
        history: &[ConversationTurn],
    ) -> Result<String, RagError> {
        if query.trim().is_empty() || namespace.trim().is_empty() {
            return Err(RagError::client("Query or repo not provided"));
        }

        self.try_answer(query, namespace, history)
            .await
            .map_err(|e| {
                error!(namespace, "Error during chat processing: {e}");
                RagError::upstream(QUERY_FAILED, e)
            })
    }

    async fn try_answer(
        &self,
        query: &str,
        namespace: &str,
        history: &[ConversationTurn],
    ) -> Result<String, RetrievalError> {
        let chunks = self.retriever.retrieve(query, namespace).await?;
        debug!(namespace, matches = chunks.len(), "Retrieved context");

        let context = build_context(&chunks);
        let messages = build_messages(&context, query, history);

        let answer = tokio::time::timeout(self.call_timeout, self.model.complete(&messages))
            .await
            .map_err(|_| RetrievalError::Timeout { stage: "completion" })??;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::mock::MockEmbedder;
    use crate::llm::Role;
    use crate::store::memory::MemoryStore;
    use crate::store::{ChunkMetadata, VectorRecord};
    use async_trait::async_trait;

    fn chunk(content: &str, file: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("demo:{file}:0000000000"),
            score: 0.5,
            content: content.to_string(),
            file: file.to_string(),
        }
    }

    #[test]
    fn test_build_context_format() {
        let ctx = build_context(&[chunk("def a(): pass", "a.py"), chunk("let b = 1;", "b.js")]);
        assert_eq!(ctx, "def a(): pass\na.py\nlet b = 1;\nb.js");
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_build_messages_order_and_roles() {
        let history = vec![
            ConversationTurn::new("You", "first question"),
            ConversationTurn::new("Bot", "first answer"),
            ConversationTurn::new("user", "follow-up"),
        ];
        let msgs = build_messages("CTX", "what?", &history);
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[0], Message::system(SYSTEM_PROMPT));
        assert_eq!(msgs[1].content, "Relevant context:\nCTX\n\nQuestion: what?");
        assert_eq!(msgs[1].role, Role::User);
        assert_eq!(msgs[2].role, Role::User);
        assert_eq!(msgs[3].role, Role::Assistant);
        assert_eq!(msgs[4].role, Role::User);
    }

    #[test]
    fn test_turn_accepts_user_key() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"user":"You","text":"hi"}"#).unwrap();
        assert!(turn.is_user());
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"speaker":"assistant","text":"hello"}"#).unwrap();
        assert!(!turn.is_user());
    }

    struct Echo;

    #[async_trait]
    impl ChatModel for Echo {
        async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
            Ok(format!("  {}  ", messages[1].content))
        }
    }

    struct Down;

    #[async_trait]
    impl ChatModel for Down {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            Err(LlmError::Status(503))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Embedder for Stalled {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![1.0; 8])
        }

        fn dimensions(&self) -> usize {
            8
        }
    }

    async fn seeded_store(embedder: &MockEmbedder) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let content = "def add(a, b):\n    return a + b";
        store
            .upsert(
                VectorRecord {
                    id: "demo:math.py:abcdef0123".into(),
                    values: embedder.embed_sync(content),
                    metadata: ChunkMetadata {
                        repo: "demo".into(),
                        file: "math.py".into(),
                        content: content.into(),
                    },
                },
                "demo",
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_answer_trims_and_includes_context() {
        let embedder = Arc::new(MockEmbedder::new(64));
        let store = seeded_store(&embedder).await;
        let retriever = Retriever::new(embedder, store, 10, Duration::from_secs(5));
        let assistant = Assistant::new(retriever, Arc::new(Echo), Duration::from_secs(5));

        let answer = assistant.answer("what does add do?", "demo", &[]).await.unwrap();
        assert!(answer.starts_with("Relevant context:\ndef add(a, b):"));
        assert!(answer.contains("math.py"));
        assert!(answer.ends_with("Question: what does add do?"));
    }

    #[tokio::test]
    async fn test_empty_inputs_are_client_errors() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let retriever = Retriever::new(
            embedder,
            Arc::new(MemoryStore::new()),
            10,
            Duration::from_secs(5),
        );
        let assistant = Assistant::new(retriever, Arc::new(Echo), Duration::from_secs(5));
        assert!(assistant.answer("  ", "demo", &[]).await.unwrap_err().is_client_error());
        assert!(assistant.answer("q", "", &[]).await.unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn test_model_failure_is_generic() {
        let embedder = Arc::new(MockEmbedder::new(8));
        let retriever = Retriever::new(
            embedder,
            Arc::new(MemoryStore::new()),
            10,
            Duration::from_secs(5),
        );
        let assistant = Assistant::new(retriever, Arc::new(Down), Duration::from_secs(5));
        let err = assistant.answer("q", "demo", &[]).await.unwrap_err();
        assert_eq!(err.public_message(), "Failed to process the query");
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_query_embedding_timeout_is_generic() {
        let retriever = Retriever::new(
            Arc::new(Stalled),
            Arc::new(MemoryStore::new()),
            10,
            Duration::from_millis(50),
        );
        assert!(matches!(
            retriever.retrieve("q", "demo").await,
            Err(RetrievalError::Timeout { stage: "embed" })
        ));

        let assistant = Assistant::new(retriever, Arc::new(Echo), Duration::from_secs(5));
        let err = assistant.answer("q", "demo", &[]).await.unwrap_err();
        assert_eq!(err.public_message(), "Failed to process the query");
    }
}
