//! Local vector store on SQLite with the sqlite-vec extension.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use sqlite_vec::sqlite3_vec_init;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;

use super::{
    ChunkMetadata, Match, NamespaceStats, StoreError, StoreStats, VectorRecord, VectorStore,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS store_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    repo TEXT NOT NULL,
    file TEXT NOT NULL,
    content TEXT NOT NULL,
    indexed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(namespace, chunk_id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_namespace ON chunks(namespace);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub struct SqliteStore {
    conn: TokioMutex<Connection>,
    dimension: usize,
}

impl SqliteStore {
    /// Open (or create) the store at `path` for vectors of `dimension` floats.
    ///
    /// An existing database created with another dimension is rejected.
    pub fn open<P: AsRef<Path>>(path: P, dimension: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Opening vector store: {}", path.display());
        init_sqlite_vec();
        Self::init(Connection::open(path)?, dimension)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory(dimension: usize) -> Result<Self, StoreError> {
        init_sqlite_vec();
        Self::init(Connection::open_in_memory()?, dimension)
    }

    fn init(conn: Connection, dimension: usize) -> Result<Self, StoreError> {
        if dimension == 0 {
            return Err(StoreError::Config("vector dimension must be positive".into()));
        }

        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM store_info WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match stored.map(|v| v.parse::<usize>()) {
            Some(Ok(expected)) if expected != dimension => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(StoreError::Config(format!("corrupt store_info: {e}"))),
            None => {
                conn.execute(
                    "INSERT INTO store_info (key, value) VALUES ('dimension', ?)",
                    params![dimension.to_string()],
                )?;
            }
        }

        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimension}]);"
        ))?;

        Ok(Self {
            conn: TokioMutex::new(conn),
            dimension,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn describe(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT namespace, COUNT(*) FROM chunks GROUP BY namespace")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut namespaces = BTreeMap::new();
        for row in rows {
            let (name, count) = row?;
            namespaces.insert(
                name,
                NamespaceStats {
                    vector_count: count as u64,
                },
            );
        }
        Ok(StoreStats {
            dimension: Some(self.dimension),
            namespaces,
        })
    }

    async fn upsert(&self, record: VectorRecord, namespace: &str) -> Result<(), StoreError> {
        if record.values.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.values.len(),
            });
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let previous: Option<i64> = tx
            .query_row(
                "SELECT id FROM chunks WHERE namespace = ? AND chunk_id = ?",
                params![namespace, record.id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(previous) = previous {
            // vec0 tables do not take part in foreign keys
            tx.execute("DELETE FROM vec_chunks WHERE rowid = ?", params![previous])?;
            tx.execute("DELETE FROM chunks WHERE id = ?", params![previous])?;
        }

        let row_id: i64 = tx.query_row(
            r#"
            INSERT INTO chunks (namespace, chunk_id, repo, file, content, indexed_at)
            VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            RETURNING id
            "#,
            params![
                namespace,
                record.id,
                record.metadata.repo,
                record.metadata.file,
                record.metadata.content
            ],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
            params![row_id, serialize_vector(&record.values)],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        include_metadata: bool,
    ) -> Result<Vec<Match>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                c.chunk_id,
                c.repo,
                c.file,
                c.content,
                vec_distance_cosine(v.embedding, ?) AS distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            WHERE c.namespace = ?
            ORDER BY distance IS NULL, distance ASC, c.chunk_id ASC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(
            params![serialize_vector(vector), namespace, top_k as i64],
            |row| {
                // zero-norm vectors have no cosine distance; NaN is stored as NULL
                let distance: Option<f64> = row.get(4)?;
                let metadata = ChunkMetadata {
                    repo: row.get(1)?,
                    file: row.get(2)?,
                    content: row.get(3)?,
                };
                Ok(Match {
                    id: row.get(0)?,
                    score: distance.map_or(0.0, |d| (1.0 - d) as f32),
                    metadata: include_metadata.then_some(metadata),
                })
            },
        )?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }
}
