//! Text embedding backends
//!
//! - `openai`: OpenAI embeddings API with an in-process TTL cache
//! - `hash`: local, credential-free feature hashing

mod cache;
mod hash;
mod openai;

pub use cache::{embedding_cache_key, CacheStats, EmbeddingCache};
pub use hash::{HashEmbedder, DEFAULT_HASH_DIMENSIONS};
pub use openai::{model_dimensions, OpenAiEmbedder};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Embedding generation trait
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch; output order matches input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;

    /// Backend identifier
    fn provider(&self) -> &str;
}

pub const SUPPORTED_PROVIDERS: [&str; 2] = ["openai", "hash"];

/// Build the embedder selected by configuration
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "openai" => Arc::new(OpenAiEmbedder::from_config(config)?),
        "hash" => Arc::new(HashEmbedder::new(
            config.dimensions.unwrap_or(DEFAULT_HASH_DIMENSIONS),
        )?),
        other => {
            return Err(RagError::config(format!(
                "Unsupported embedding provider: '{}'. Supported providers: {}",
                other,
                SUPPORTED_PROVIDERS.join(", ")
            ))
            .with_details(json!({
                "provider": other,
                "supported_providers": SUPPORTED_PROVIDERS,
            })))
        }
    };
    tracing::info!(
        provider = embedder.provider(),
        model = embedder.model_name(),
        dimensions = embedder.dimensions(),
        "initialized embedder"
    );
    Ok(embedder)
}

/// Cosine similarity; 0.0 when either vector has zero norm or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Convert embedding to little-endian bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert stored bytes back to an embedding; trailing partial floats are ignored
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_embedding_bytes_roundtrip() {
        let embedding = vec![0.25f32, -1.5, 3.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes), embedding);
    }

    #[test]
    fn test_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "cohere".into(),
            ..EmbeddingConfig::default()
        };
        let err = build_embedder(&config).err().unwrap();
        assert!(matches!(err, RagError::Configuration { .. }));
        assert_eq!(err.details()["supported_providers"], json!(["openai", "hash"]));
    }
}
