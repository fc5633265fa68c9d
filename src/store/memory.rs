//! In-process [`VectorStore`], used by tests and `backend = "memory"`.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{
    ChunkMetadata, Match, NamespaceStats, StoreError, StoreStats, VectorRecord, VectorStore,
    cosine_similarity,
};

struct StoredVector {
    values: Vec<f32>,
    metadata: ChunkMetadata,
}

#[derive(Default)]
struct Inner {
    dimension: Option<usize>,
    namespaces: BTreeMap<String, HashMap<String, StoredVector>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Task("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Task("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn describe(&self) -> Result<StoreStats, StoreError> {
        let inner = self.read()?;
        let namespaces = inner
            .namespaces
            .iter()
            .filter(|(_, records)| !records.is_empty())
            .map(|(name, records)| {
                (
                    name.clone(),
                    NamespaceStats {
                        vector_count: records.len() as u64,
                    },
                )
            })
            .collect();
        Ok(StoreStats {
            dimension: inner.dimension,
            namespaces,
        })
    }

    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        match inner.dimension {
            Some(expected) if expected != record.values.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: record.values.len(),
                });
            }
            Some(_) => {}
            None => inner.dimension = Some(record.values.len()),
        }
        inner
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(
                record.id,
                StoredVector {
                    values: record.values,
                    metadata: record.metadata,
                },
            );
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError> {
        let inner = self.read()?;
        let Some(records) = inner.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<Match> = records
            .iter()
            .map(|(id, stored)| Match {
                id: id.clone(),
                score: cosine_similarity(vector, &stored.values),
                metadata: include_metadata.then(|| stored.metadata.clone()),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, values: Vec<f32>, content: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            metadata: ChunkMetadata {
                repo: "demo".to_string(),
                file: "a.py".to_string(),
                content: content.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.upsert(record("x", vec![1.0, 0.0], "x"), "one").await.unwrap();
        store.upsert(record("y", vec![0.0, 1.0], "y"), "two").await.unwrap();

        let hits = store.query(&[1.0, 0.0], 10, "two", true).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "y");
        assert!(store.query(&[1.0, 0.0], 10, "three", true).await.unwrap().is_empty());
        assert_eq!(store.list_namespaces().await.unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let store = MemoryStore::new();
        store.upsert(record("x", vec![1.0, 0.0], "old"), "ns").await.unwrap();
        store.upsert(record("x", vec![0.0, 1.0], "new"), "ns").await.unwrap();

        let stats = store.describe().await.unwrap();
        assert_eq!(stats.namespaces["ns"].vector_count, 1);
        let hits = store.query(&[0.0, 1.0], 1, "ns", true).await.unwrap();
        assert_eq!(hits[0].metadata.as_ref().unwrap().content, "new");
    }

    #[tokio::test]
    async fn test_query_orders_by_score_and_truncates() {
        let store = MemoryStore::new();
        store.upsert(record("far", vec![0.0, 1.0], "far"), "ns").await.unwrap();
        store.upsert(record("near", vec![1.0, 0.1], "near"), "ns").await.unwrap();
        store.upsert(record("mid", vec![1.0, 1.0], "mid"), "ns").await.unwrap();

        let hits = store.query(&[1.0, 0.0], 2, "ns", false).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits[0].metadata.is_none());
    }

    #[tokio::test]
    async fn test_dimension_is_fixed_by_first_vector() {
        let store = MemoryStore::new();
        store.upsert(record("a", vec![1.0, 0.0], "a"), "ns").await.unwrap();
        let err = store.upsert(record("b", vec![1.0], "b"), "ns").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 2, actual: 1 }
        ));
    }
}
