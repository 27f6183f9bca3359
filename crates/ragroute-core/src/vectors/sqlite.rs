//! SQLite-backed vector store
//!
//! Embeddings are stored as little-endian f32 BLOBs. Similarity is computed
//! by a `cosine_similarity(a, b)` scalar function registered on the
//! connection, so ranking happens inside the query.

use super::{
    check_batch, check_dimensions_config, check_query, duplicate_id, record_not_found,
    sequence_id, Metadata, MetadataFilter, NewRecord, RetrievalResult, StoredRecord, VectorStore,
};
use crate::db::immediate;
use crate::embeddings::{bytes_to_embedding, cosine_similarity, embedding_to_bytes};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS vector_records (
    seq INTEGER PRIMARY KEY,
    id TEXT NOT NULL UNIQUE,
    embedding BLOB NOT NULL,
    text TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vector_store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Vector store over a SQLite database file
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl SqliteVectorStore {
    /// Open database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::initialize(Connection::open(path)?, dimensions)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?, dimensions)
    }

    fn initialize(conn: Connection, dimensions: usize) -> Result<Self> {
        check_dimensions_config(dimensions)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(CREATE_TABLES)?;
        register_functions(&conn)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM vector_store_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match stored.map(|v| v.parse::<usize>()) {
            Some(Ok(existing)) if existing != dimensions => {
                return Err(RagError::config(format!(
                    "Vector store holds {}-dimensional vectors, but {} were configured",
                    existing, dimensions
                ))
                .with_details(json!({
                    "stored_dimensions": existing,
                    "configured_dimensions": dimensions,
                })));
            }
            Some(Ok(_)) => {}
            Some(Err(_)) | None => {
                conn.execute(
                    "INSERT OR REPLACE INTO vector_store_meta (key, value) VALUES ('dimensions', ?1)",
                    params![dimensions.to_string()],
                )?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
        })
    }

    /// Run blocking database work off the async executor
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn);
            f(&guard)
        })
        .await
        .map_err(|e| RagError::Io(std::io::Error::other(e)))?
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|e| e.into_inner())
}

fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "cosine_similarity",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let a = ctx
                .get_raw(0)
                .as_blob()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            let b = ctx
                .get_raw(1)
                .as_blob()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(cosine_similarity(&bytes_to_embedding(a), &bytes_to_embedding(b)) as f64)
        },
    )?;
    Ok(())
}

fn next_seq(conn: &Connection) -> Result<u64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM vector_store_meta WHERE key = 'next_seq'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match value {
        None => Ok(0),
        Some(raw) => raw.parse().map_err(|_| {
            RagError::config(format!("vector store has a corrupt next_seq value '{}'", raw))
        }),
    }
}

fn set_next_seq(conn: &Connection, seq: u64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO vector_store_meta (key, value) VALUES ('next_seq', ?1)",
        params![seq.to_string()],
    )?;
    Ok(())
}

fn parse_metadata(raw: &str) -> Metadata {
    serde_json::from_str(raw).unwrap_or_default()
}

/// SQL condition and parameters for one filter entry
fn filter_clause(key: &str, value: &Value, params: &mut Vec<SqlValue>) -> String {
    params.push(SqlValue::Text(format!("$.\"{}\"", key)));
    let path = params.len();
    match value {
        Value::Null => format!("json_type(metadata, ?{}) = 'null'", path),
        Value::Bool(b) => {
            params.push(SqlValue::Integer(*b as i64));
            format!(
                "(json_type(metadata, ?{p}) IN ('true', 'false') AND json_extract(metadata, ?{p}) = ?{v})",
                p = path,
                v = params.len()
            )
        }
        Value::Number(n) => {
            params.push(match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            });
            format!(
                "(json_type(metadata, ?{p}) IN ('integer', 'real') AND json_extract(metadata, ?{p}) = ?{v})",
                p = path,
                v = params.len()
            )
        }
        Value::String(s) => {
            params.push(SqlValue::Text(s.clone()));
            format!(
                "(json_type(metadata, ?{p}) = 'text' AND json_extract(metadata, ?{p}) = ?{v})",
                p = path,
                v = params.len()
            )
        }
        // Rejected by MetadataFilter::validate
        Value::Array(_) | Value::Object(_) => "0".to_string(),
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<String>> {
        check_batch(&records, self.dimensions)?;
        let count = records.len();

        let ids = self
            .with_conn(move |conn| {
                immediate(conn, |conn| {
                    let mut seq = next_seq(conn)?;
                    let now = Utc::now().to_rfc3339();
                    let mut ids = Vec::with_capacity(records.len());

                    let mut exists = conn.prepare("SELECT 1 FROM vector_records WHERE id = ?1")?;
                    let mut insert = conn.prepare(
                        "INSERT INTO vector_records (seq, id, embedding, text, metadata, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;

                    for record in records {
                        let id = record.id.unwrap_or_else(|| sequence_id(seq));
                        if exists.exists(params![id])? {
                            return Err(duplicate_id(&id));
                        }
                        insert.execute(params![
                            seq as i64,
                            id,
                            embedding_to_bytes(&record.embedding),
                            record.text,
                            serde_json::to_string(&record.metadata)?,
                            now,
                        ])?;
                        ids.push(id);
                        seq += 1;
                    }

                    set_next_seq(conn, seq)?;
                    Ok(ids)
                })
            })
            .await?;

        tracing::debug!(added = count, "sqlite store add");
        Ok(ids)
    }

    async fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<RetrievalResult>> {
        check_query(query, self.dimensions)?;
        filter.validate()?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut sql_params: Vec<SqlValue> = vec![SqlValue::Blob(embedding_to_bytes(query))];
        let mut clauses = Vec::new();
        for (key, value) in filter.conditions() {
            clauses.push(filter_clause(key, value, &mut sql_params));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        sql_params.push(SqlValue::Integer(top_k.min(i64::MAX as usize) as i64));

        let sql = format!(
            "SELECT id, text, metadata, cosine_similarity(embedding, ?1) AS score
             FROM vector_records
             {}
             ORDER BY score DESC, seq ASC
             LIMIT ?{}",
            where_clause,
            sql_params.len()
        );

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let results = stmt
                .query_map(params_from_iter(sql_params), |row| {
                    let metadata: String = row.get(2)?;
                    let score: f64 = row.get(3)?;
                    Ok(RetrievalResult {
                        id: row.get(0)?,
                        text: row.get(1)?,
                        metadata: parse_metadata(&metadata),
                        score: score as f32,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(results)
        })
        .await
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.with_conn(move |conn| {
            immediate(conn, |conn| {
                let mut stmt = conn.prepare("DELETE FROM vector_records WHERE id = ?1")?;
                let mut removed = 0;
                for id in &ids {
                    removed += stmt.execute(params![id])?;
                }
                Ok(removed)
            })
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<StoredRecord> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, embedding, text, metadata FROM vector_records WHERE id = ?1",
                params![id],
                |row| {
                    let embedding: Vec<u8> = row.get(1)?;
                    let metadata: String = row.get(3)?;
                    Ok(StoredRecord {
                        id: row.get(0)?,
                        embedding: bytes_to_embedding(&embedding),
                        text: row.get(2)?,
                        metadata: parse_metadata(&metadata),
                    })
                },
            )
            .optional()?
            .ok_or_else(|| record_not_found(&id))
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let removed = self
            .with_conn(|conn| {
                immediate(conn, |conn| {
                    let removed = conn.execute("DELETE FROM vector_records", [])?;
                    set_next_seq(conn, 0)?;
                    Ok(removed)
                })
            })
            .await?;
        tracing::info!(removed, "cleared sqlite vector store");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM vector_records", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}
