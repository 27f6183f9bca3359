//! Embedded vector store: in-memory index persisted to `index.json`

use super::{
    check_batch, check_dimensions_config, check_query, duplicate_id, record_not_found,
    sequence_id, Metadata, MetadataFilter, NewRecord, RetrievalResult, StoredRecord, VectorStore,
};
use crate::embeddings::cosine_similarity;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    seq: u64,
    id: String,
    embedding: Vec<f32>,
    text: String,
    metadata: Metadata,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    dimensions: usize,
    next_seq: u64,
    records: Vec<Entry>,
}

#[derive(Default)]
struct State {
    next_seq: u64,
    /// Insertion order
    records: BTreeMap<u64, Entry>,
    by_id: HashMap<String, u64>,
}

/// In-process vector index.
///
/// Searches scan every record under a shared lock; mutations take the lock
/// exclusively and rewrite the index file before releasing it.
pub struct LocalVectorStore {
    dir: Option<PathBuf>,
    dimensions: usize,
    state: RwLock<State>,
}

impl LocalVectorStore {
    /// Open (or create) the index stored in `dir`
    pub fn open(dir: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        check_dimensions_config(dimensions)?;
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(INDEX_FILE);
        let state = if path.exists() {
            let file: IndexFile = serde_json::from_slice(&std::fs::read(&path)?)?;
            if file.dimensions != dimensions {
                return Err(RagError::config(format!(
                    "Vector store at {} holds {}-dimensional vectors, but {} were configured",
                    dir.display(),
                    file.dimensions,
                    dimensions
                ))
                .with_details(json!({
                    "stored_dimensions": file.dimensions,
                    "configured_dimensions": dimensions,
                })));
            }
            let mut state = State {
                next_seq: file.next_seq,
                ..State::default()
            };
            for entry in file.records {
                state.by_id.insert(entry.id.clone(), entry.seq);
                state.records.insert(entry.seq, entry);
            }
            tracing::debug!(records = state.records.len(), "loaded local vector index");
            state
        } else {
            State::default()
        };

        let store = Self {
            dir: Some(dir),
            dimensions,
            state: RwLock::new(state),
        };
        store.persist(&store.read())?;
        Ok(store)
    }

    /// Store without persistence
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        check_dimensions_config(dimensions)?;
        Ok(Self {
            dir: None,
            dimensions,
            state: RwLock::new(State::default()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the index atomically: temp file, then rename
    fn persist(&self, state: &State) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let file = IndexFile {
            version: INDEX_VERSION,
            dimensions: self.dimensions,
            next_seq: state.next_seq,
            records: state.records.values().cloned().collect(),
        };
        let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
        std::fs::write(&tmp, serde_json::to_vec(&file)?)?;
        std::fs::rename(&tmp, dir.join(INDEX_FILE))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn add(&self, records: Vec<NewRecord>) -> Result<Vec<String>> {
        check_batch(&records, self.dimensions)?;
        let mut state = self.write();

        // Resolve every id before touching the index
        let mut seq = state.next_seq;
        let mut planned = Vec::with_capacity(records.len());
        for record in &records {
            let id = record.id.clone().unwrap_or_else(|| sequence_id(seq));
            if state.by_id.contains_key(&id) || planned.iter().any(|(_, p)| p == &id) {
                return Err(duplicate_id(&id));
            }
            planned.push((seq, id));
            seq += 1;
        }

        let mut ids = Vec::with_capacity(records.len());
        for ((seq, id), record) in planned.into_iter().zip(records) {
            state.by_id.insert(id.clone(), seq);
            state.records.insert(
                seq,
                Entry {
                    seq,
                    id: id.clone(),
                    embedding: record.embedding,
                    text: record.text,
                    metadata: record.metadata,
                },
            );
            ids.push(id);
        }
        let previous_seq = state.next_seq;
        state.next_seq = seq;

        if let Err(err) = self.persist(&state) {
            // Keep memory and disk consistent
            for id in &ids {
                if let Some(seq) = state.by_id.remove(id) {
                    state.records.remove(&seq);
                }
            }
            state.next_seq = previous_seq;
            return Err(err);
        }

        tracing::debug!(added = ids.len(), total = state.records.len(), "local store add");
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

        let state = self.read();
        let mut scored: Vec<(f32, &Entry)> = state
            .records
            .values()
            .filter(|e| filter.matches(&e.metadata))
            .map(|e| (cosine_similarity(query, &e.embedding), e))
            .collect();

        // BTreeMap iteration is in seq order and the sort is stable
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, e)| RetrievalResult {
                id: e.id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut state = self.write();
        let mut removed = Vec::new();
        for id in ids {
            if let Some(seq) = state.by_id.remove(id) {
                if let Some(entry) = state.records.remove(&seq) {
                    removed.push(entry);
                }
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.persist(&state) {
            for entry in removed {
                state.by_id.insert(entry.id.clone(), entry.seq);
                state.records.insert(entry.seq, entry);
            }
            return Err(err);
        }
        Ok(removed.len())
    }

    async fn get(&self, id: &str) -> Result<StoredRecord> {
        let state = self.read();
        state
            .by_id
            .get(id)
            .and_then(|seq| state.records.get(seq))
            .map(|e| StoredRecord {
                id: e.id.clone(),
                embedding: e.embedding.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
            })
            .ok_or_else(|| record_not_found(id))
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.write();
        let previous = std::mem::take(&mut *state);
        if let Err(err) = self.persist(&state) {
            *state = previous;
            return Err(err);
        }
        tracing::info!(removed = previous.records.len(), "cleared local vector store");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read().records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(v: Vec<f32>, text: &str) -> NewRecord {
        NewRecord::new(v, text, Metadata::new())
    }

    #[tokio::test]
    async fn test_search_orders_by_score_then_insertion() {
        let store = LocalVectorStore::in_memory(2).unwrap();
        let ids = store
            .add(vec![
                record(vec![0.0, 1.0], "up"),
                record(vec![1.0, 0.0], "right-1"),
                record(vec![2.0, 0.0], "right-2"),
            ])
            .await
            .unwrap();
        assert_eq!(ids, vec!["rec-0000000000", "rec-0000000001", "rec-0000000002"]);

        let results = store.search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].text, "right-1");
        assert_eq!(results[1].text, "right-2");
        assert_eq!(results[2].text, "up");
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejects_whole_batch() {
        let store = LocalVectorStore::in_memory(2).unwrap();
        let err = store
            .add(vec![record(vec![1.0, 0.0], "ok"), record(vec![1.0], "bad")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_existing_id_is_rejected() {
        let store = LocalVectorStore::in_memory(1).unwrap();
        store
            .add(vec![record(vec![1.0], "a").with_id("doc_chunk_0")])
            .await
            .unwrap();
        let err = store
            .add(vec![record(vec![1.0], "b").with_id("doc_chunk_0")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalVectorStore::open(dir.path(), 2).unwrap();
            store
                .add(vec![record(vec![1.0, 0.0], "kept"), record(vec![0.0, 1.0], "gone")])
                .await
                .unwrap();
            store.delete(&["rec-0000000001".to_string()]).await.unwrap();
        }

        let store = LocalVectorStore::open(dir.path(), 2).unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("rec-0000000000").await.unwrap().text, "kept");

        // Sequence continues after reload
        let ids = store.add(vec![record(vec![1.0, 1.0], "new")]).await.unwrap();
        assert_eq!(ids, vec!["rec-0000000002"]);
        assert!(!dir.path().join("index.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reopen_with_other_dimensions_fails() {
        let dir = tempfile::tempdir().unwrap();
        LocalVectorStore::open(dir.path(), 3).unwrap();
        let err = LocalVectorStore::open(dir.path(), 4).err().unwrap();
        assert!(matches!(err, RagError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_clear_resets_sequence() {
        let store = LocalVectorStore::in_memory(1).unwrap();
        store.add(vec![record(vec![1.0], "a")]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        let ids = store.add(vec![record(vec![1.0], "b")]).await.unwrap();
        assert_eq!(ids, vec!["rec-0000000000"]);
    }
}
