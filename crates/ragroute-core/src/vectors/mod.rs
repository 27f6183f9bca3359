//! Vector storage
//!
//! One [`VectorStore`] contract with two interchangeable backends:
//! - `local`: in-memory index persisted as JSON in a directory
//! - `sqlite`: SQLite table with cosine similarity computed in SQL
//!
//! Given the same calls both backends assign the same ids and return the
//! same results in the same order.

mod local;
mod sqlite;

pub use local::LocalVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::config::VectorStoreConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Arbitrary JSON metadata attached to documents, chunks and records
pub type Metadata = serde_json::Map<String, Value>;

pub const SUPPORTED_BACKENDS: [&str; 2] = ["sqlite", "local"];

/// Record to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    /// Caller-chosen id; assigned from the insertion sequence when `None`
    pub id: Option<String>,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl NewRecord {
    pub fn new(embedding: Vec<f32>, text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: None,
            embedding,
            text: text.into(),
            metadata,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Record as held by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

/// Search hit with its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

/// Metadata equality conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.conditions.iter()
    }

    /// Keys must be plain labels and values scalars
    pub fn validate(&self) -> Result<()> {
        for (key, value) in &self.conditions {
            if key.is_empty() || key.contains('"') {
                return Err(RagError::validation(format!("invalid filter key: {:?}", key))
                    .with_details(json!({ "key": key })));
            }
            if value.is_array() || value.is_object() {
                return Err(RagError::validation(format!(
                    "filter value for '{}' must be a scalar",
                    key
                ))
                .with_details(json!({ "key": key })));
            }
        }
        Ok(())
    }

    /// Numbers compare by value, so `1` matches `1.0`
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| match (metadata.get(key), expected) {
                (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
                (Some(actual), expected) => actual == expected,
                (None, _) => false,
            })
    }
}

/// Uniform vector storage contract
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend identifier
    fn backend(&self) -> &'static str;

    /// Dimensionality every stored vector must have
    fn dimensions(&self) -> usize;

    /// Insert records atomically; returns their ids in input order
    async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<String>>;

    /// Top-k records by cosine similarity, best first; ties by insertion order
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievalResult>> {
        self.search_filtered(query, top_k, &MetadataFilter::default())
            .await
    }

    /// [`search`](VectorStore::search) restricted to records matching `filter`
    async fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<RetrievalResult>>;

    /// Remove records; unknown ids are ignored. Returns how many were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn get(&self, id: &str) -> Result<StoredRecord>;

    /// Remove every record
    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// Open the backend selected by configuration
pub fn build_vector_store(
    config: &VectorStoreConfig,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>> {
    let path = config.resolved_path();
    let store: Arc<dyn VectorStore> = match config.provider.as_str() {
        "sqlite" => Arc::new(SqliteVectorStore::open(&path, dimensions)?),
        "local" => Arc::new(LocalVectorStore::open(&path, dimensions)?),
        other => {
            return Err(RagError::config(format!(
                "Unsupported vector store provider: '{}'. Supported providers: {}",
                other,
                SUPPORTED_BACKENDS.join(", ")
            ))
            .with_details(json!({
                "provider": other,
                "supported_providers": SUPPORTED_BACKENDS,
            })))
        }
    };
    tracing::info!(
        backend = store.backend(),
        path = %path.display(),
        dimensions,
        "opened vector store"
    );
    Ok(store)
}

/// Id assigned to the record at insertion sequence `seq`
pub(crate) fn sequence_id(seq: u64) -> String {
    format!("rec-{:010}", seq)
}

pub(crate) fn check_dimensions_config(dimensions: usize) -> Result<()> {
    if dimensions == 0 {
        return Err(RagError::config("vector store dimensions must be positive"));
    }
    Ok(())
}

pub(crate) fn check_query(query: &[f32], dimensions: usize) -> Result<()> {
    check_vector(query, dimensions)
}

/// Right length and every component finite
fn check_vector(vector: &[f32], dimensions: usize) -> Result<()> {
    if vector.len() != dimensions {
        return Err(dimension_mismatch(vector.len(), dimensions));
    }
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(
            RagError::validation("Embedding contains a non-finite component")
                .with_details(json!({ "index": index })),
        );
    }
    Ok(())
}

fn dimension_mismatch(got: usize, expected: usize) -> RagError {
    RagError::validation(format!(
        "Embedding dimension mismatch: expected {}, got {}",
        expected, got
    ))
    .with_details(json!({ "expected": expected, "actual": got }))
}

/// Checks that need no store state: vector shape, empty and repeated ids
pub(crate) fn check_batch(records: &[NewRecord], dimensions: usize) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        check_vector(&record.embedding, dimensions)?;
        if let Some(id) = &record.id {
            if id.trim().is_empty() {
                return Err(RagError::validation("record id must not be empty"));
            }
            if !seen.insert(id.as_str()) {
                return Err(duplicate_id(id));
            }
        }
    }
    Ok(())
}

pub(crate) fn duplicate_id(id: &str) -> RagError {
    RagError::validation(format!("Vector record '{}' already exists", id))
        .with_details(json!({ "id": id }))
}

pub(crate) fn record_not_found(id: &str) -> RagError {
    RagError::not_found(format!("vector record '{}'", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        let mut meta = Metadata::new();
        meta.insert("form_type".into(), json!("10-K"));
        meta.insert("page".into(), json!(3));

        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::new().with("form_type", "10-K").matches(&meta));
        assert!(MetadataFilter::new().with("page", 3.0).matches(&meta));
        assert!(!MetadataFilter::new().with("form_type", "10-Q").matches(&meta));
        assert!(!MetadataFilter::new().with("missing", "x").matches(&meta));
    }

    #[test]
    fn test_filter_validation() {
        assert!(MetadataFilter::new().with("a", json!([1])).validate().is_err());
        assert!(MetadataFilter::new().with("a\"b", 1).validate().is_err());
        assert!(MetadataFilter::new().with("a", 1).validate().is_ok());
    }

    #[test]
    fn test_check_batch() {
        let rec = |id: &str, dims: usize| {
            NewRecord::new(vec![0.0; dims], "t", Metadata::new()).with_id(id)
        };
        assert!(check_batch(&[rec("a", 2), rec("b", 2)], 2).is_ok());
        assert!(matches!(
            check_batch(&[rec("a", 3)], 2),
            Err(RagError::Validation { .. })
        ));
        assert!(check_batch(&[rec("a", 2), rec("a", 2)], 2).is_err());
    }

    #[test]
    fn test_non_finite_components_rejected() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let record = NewRecord::new(vec![1.0, bad], "t", Metadata::new());
            assert!(matches!(
                check_batch(&[record], 2),
                Err(RagError::Validation { .. })
            ));
            assert!(matches!(
                check_query(&[bad, 0.0], 2),
                Err(RagError::Validation { .. })
            ));
        }
        assert!(check_query(&[0.0, 0.0], 2).is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let config = VectorStoreConfig {
            provider: "pinecone".into(),
            path: Some(std::env::temp_dir()),
        };
        let err = build_vector_store(&config, 4).err().unwrap();
        assert!(matches!(err, RagError::Configuration { .. }));
    }
}
