//! Embeddings from an OpenAI-compatible `/embeddings` endpoint
//! (OpenAI, text-embeddings-inference, Ollama, vLLM, ...).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbedderError};

pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl HttpEmbedder {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        mut base_url: String,
        model: String,
        dimensions: usize,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            api_key,
            base_url,
            model,
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let body = EmbeddingRequest {
            input: text,
            model: &self.model,
        };
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!("embedding API error {status}: {text}");
            return Err(EmbedderError::Status {
                status: status.as_u16(),
            });
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;
        let embedding = resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedderError::InvalidResponse("no embedding returned".into()))?;

        if embedding.len() != self.dimensions {
            return Err(EmbedderError::InvalidResponse(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_response() {
        let json = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2,0.3]}],"model":"m"}"#;
        let resp: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data.len(), 1);
        assert_eq!(resp.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_base_url_trailing_slashes_trimmed() {
        let e = HttpEmbedder::new(
            reqwest::Client::new(),
            None,
            "http://localhost:8080/v1//".into(),
            "m".into(),
            3,
        );
        assert_eq!(e.base_url, "http://localhost:8080/v1");
        assert_eq!(e.dimensions(), 3);
    }

    #[test]
    fn test_debug_redacts_key() {
        let e = HttpEmbedder::new(
            reqwest::Client::new(),
            Some("sk-secret".into()),
            "http://x".into(),
            "m".into(),
            3,
        );
        let dbg = format!("{e:?}");
        assert!(!dbg.contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_http_error() {
        let e = HttpEmbedder::new(
            reqwest::Client::new(),
            None,
            "http://127.0.0.1:9".into(),
            "m".into(),
            3,
        );
        assert!(matches!(e.embed("x").await, Err(EmbedderError::Http(_))));
    }
}
