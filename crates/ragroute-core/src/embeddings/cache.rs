//! Embedding caching to reduce API calls

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CacheEntry {
    value: Vec<f32>,
    expires_at: Instant,
}

const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// In-memory TTL cache of embeddings, bounded in size.
///
/// Inserting into a full cache first drops expired entries, then the entry
/// closest to expiry.
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl EmbeddingCache {
    /// Create new cache with default TTL of 1 hour
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Get cached value if exists and not expired
    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        (Instant::now() < entry.expires_at).then(|| entry.value.clone())
    }

    pub fn set(&self, key: String, value: Vec<f32>) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            expires_at: now + self.ttl,
        };
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.max_entries && !entries.contains_key(&key) {
                entries.retain(|_, e| now < e.expires_at);
                if entries.len() >= self.max_entries {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, e)| e.expires_at)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                    }
                }
            }
            entries.insert(key, entry);
        }
    }

    /// Clear expired entries
    pub fn cleanup(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let now = Instant::now();
            entries.retain(|_, entry| now < entry.expires_at);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        match self.entries.read() {
            Ok(entries) => {
                let now = Instant::now();
                let total = entries.len();
                let expired = entries.values().filter(|e| now >= e.expires_at).count();
                CacheStats {
                    total_entries: total,
                    expired_entries: expired,
                    active_entries: total - expired,
                }
            }
            Err(_) => CacheStats::default(),
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

/// Cache key for an embedding of `text` under `model`
pub fn embedding_cache_key(model: &str, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    format!("embed:{}:{}", model, hasher.finalize().to_hex())
}
