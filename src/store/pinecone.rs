//! Pinecone index over its REST API.
//!
//! The data plane (`describe_index_stats`, `vectors/upsert`, `query`) is
//! addressed by the index host. When no host is configured it is looked up on
//! the control plane, creating a serverless cosine index if none exists.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    ChunkMetadata, Match, NamespaceStats, StoreError, StoreStats, VectorRecord, VectorStore,
};

const CONTROL_PLANE: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

pub struct PineconeStore {
    client: reqwest::Client,
    api_key: String,
    host: String,
}

impl fmt::Debug for PineconeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeStore")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

/// Settings for provisioning an index that does not exist yet.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub cloud: String,
    pub region: String,
}

impl PineconeStore {
    /// Talk to an index whose data-plane host is already known.
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: String, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Self {
            client,
            api_key,
            host,
        }
    }

    /// Resolve the host of `spec.name`, creating the index first if needed.
    pub async fn connect(
        client: reqwest::Client,
        api_key: String,
        spec: &IndexSpec,
    ) -> Result<Self, StoreError> {
        let described = client
            .get(format!("{CONTROL_PLANE}/indexes/{}", spec.name))
            .header("Api-Key", &api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await?;

        let status = described.status();
        let description: IndexDescription = if status == reqwest::StatusCode::NOT_FOUND {
            info!(index = %spec.name, dimension = spec.dimension, "Creating Pinecone index");
            let body = CreateIndexRequest {
                name: &spec.name,
                dimension: spec.dimension,
                metric: "cosine",
                spec: ServerlessSpec {
                    serverless: ServerlessLocation {
                        cloud: &spec.cloud,
                        region: &spec.region,
                    },
                },
            };
            let created = client
                .post(format!("{CONTROL_PLANE}/indexes"))
                .header("Api-Key", &api_key)
                .header("X-Pinecone-API-Version", API_VERSION)
                .json(&body)
                .send()
                .await?;
            read_json(created).await?
        } else {
            read_json(described).await?
        };

        match description.dimension {
            Some(dimension) if dimension != spec.dimension => {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: spec.dimension,
                });
            }
            _ => {}
        }
        if description.host.is_empty() {
            return Err(StoreError::Config(format!(
                "Pinecone index {} has no host yet",
                spec.name
            )));
        }

        Ok(Self::new(client, api_key, &description.host))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, StoreError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        warn!("Pinecone API error {status}: {text}");
        return Err(StoreError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text)
        .map_err(|e| StoreError::Task(format!("unexpected Pinecone response: {e}")))
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn describe(&self) -> Result<StoreStats, StoreError> {
        let response = self
            .post("describe_index_stats")
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let stats: IndexStats = read_json(response).await?;
        Ok(StoreStats {
            dimension: stats.dimension,
            namespaces: stats
                .namespaces
                .into_iter()
                .map(|(name, ns)| {
                    (
                        name,
                        NamespaceStats {
                            vector_count: ns.vector_count,
                        },
                    )
                })
                .collect(),
        })
    }

    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<(), StoreError> {
        let body = UpsertRequest {
            vectors: [ApiVector {
                id: &record.id,
                values: &record.values,
                metadata: &record.metadata,
            }],
            namespace,
        };
        let response = self.post("vectors/upsert").json(&body).send().await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError> {
        let body = QueryRequest {
            vector,
            top_k,
            namespace,
            include_metadata,
            include_values: false,
        };
        let response = self.post("query").json(&body).send().await?;
        let resp: QueryResponse = read_json(response).await?;
        Ok(resp
            .matches
            .into_iter()
            .map(|m| Match {
                id: m.id,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    serverless: ServerlessLocation<'a>,
}

#[derive(Serialize)]
struct ServerlessLocation<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
struct IndexDescription {
    #[serde(default)]
    host: String,
    dimension: Option<usize>,
}

#[derive(Deserialize)]
struct IndexStats {
    #[serde(default)]
    namespaces: BTreeMap<String, ApiNamespace>,
    dimension: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiNamespace {
    #[serde(default)]
    vector_count: u64,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: [ApiVector<'a>; 1],
    namespace: &'a str,
}

#[derive(Serialize)]
struct ApiVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a ChunkMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    namespace: &'a str,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ApiMatch>,
}

#[derive(Deserialize)]
struct ApiMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_gets_scheme() {
        let store = PineconeStore::new(
            reqwest::Client::new(),
            "key".into(),
            "codebase-rag-abc.svc.pinecone.io/",
        );
        assert_eq!(store.host, "https://codebase-rag-abc.svc.pinecone.io");

        let local = PineconeStore::new(reqwest::Client::new(), "key".into(), "http://localhost:5080");
        assert_eq!(local.host, "http://localhost:5080");
    }

    #[test]
    fn test_debug_redacts_key() {
        let store = PineconeStore::new(reqwest::Client::new(), "secret-key".into(), "h");
        let dbg = format!("{store:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_parse_stats() {
        let json = r#"{"namespaces":{"flask":{"vectorCount":42},"":{"vectorCount":1}},"dimension":768,"totalVectorCount":43}"#;
        let stats: IndexStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.dimension, Some(768));
        assert_eq!(stats.namespaces["flask"].vector_count, 42);
    }

    #[test]
    fn test_serialize_query_camel_case() {
        let body = QueryRequest {
            vector: &[0.5],
            top_k: 10,
            namespace: "flask",
            include_metadata: true,
            include_values: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["topK"], 10);
        assert_eq!(value["includeMetadata"], true);
        assert_eq!(value["namespace"], "flask");
    }

    #[test]
    fn test_parse_query_matches() {
        let json = r#"{"matches":[
            {"id":"flask:app.py:0123456789","score":0.91,"metadata":{"repo":"flask.git","file":"app.py","content":"def run(): pass"}},
            {"id":"flask:x.py:abcdef0123","score":0.5}
        ],"namespace":"flask"}"#;
        let resp: QueryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.matches.len(), 2);
        assert_eq!(resp.matches[0].metadata.as_ref().unwrap().file, "app.py");
        assert!(resp.matches[1].metadata.is_none());
    }
}
