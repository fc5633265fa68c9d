use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatModel, LlmError, Message};

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl fmt::Debug for OpenAiChat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiChat")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiChat {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        mut base_url: String,
        model: String,
        max_tokens: u32,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            api_key,
            base_url,
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }

        if !status.is_success() {
            tracing::error!("chat completion API error {status}: {text}");
            return Err(LlmError::Status(status.as_u16()));
        }

        let resp: ChatResponse = serde_json::from_str(&text)?;

        if let Some(usage) = &resp.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion usage"
            );
        }

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse { provider: "openai" })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiChat {
        OpenAiChat::new(
            reqwest::Client::new(),
            Some("sk-test".into()),
            "https://api.openai.com/v1/".into(),
            "gpt-4o".into(),
            1024,
        )
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(provider().base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let dbg = format!("{:?}", provider());
        assert!(!dbg.contains("sk-test"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_serialize_request_roles_lowercase() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let body = ChatRequest {
            model: "gpt-4o",
            messages: &messages,
            max_tokens: 10,
            stream: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_parse_chat_response() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"  Hello  "}}],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("  Hello  "));
        assert_eq!(resp.usage.unwrap().completion_tokens, 2);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let chat = OpenAiChat::new(
            reqwest::Client::new(),
            None,
            "http://127.0.0.1:9".into(),
            "m".into(),
            16,
        );
        let err = chat.complete(&[Message::user("x")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));
    }
}
