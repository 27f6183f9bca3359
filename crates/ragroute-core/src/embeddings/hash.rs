//! Local feature-hashing embedder

use super::Embedder;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_HASH_DIMENSIONS: usize = 384;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
}

/// Deterministic embedder hashing lower-cased word tokens into a fixed
/// number of signed buckets, then L2-normalising.
///
/// Needs no credentials or network, so it backs offline runs and tests.
/// Texts sharing words get positive cosine similarity.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    model: String,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(RagError::config("embedding dimensions must be positive"));
        }
        Ok(Self {
            dimensions,
            model: format!("feature-hash-{}", dimensions),
        })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lowered = text.to_lowercase();

        for token in WORD.find_iter(&lowered) {
            let hash = blake3::hash(token.as_str().as_bytes());
            let bytes = hash.as_bytes();
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed("The quick brown fox").await.unwrap();
        let b = embedder.embed("the QUICK brown fox!").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let embedder = HashEmbedder::new(DEFAULT_HASH_DIMENSIONS).unwrap();
        let doc = embedder
            .embed("Rust ownership rules prevent data races")
            .await
            .unwrap();
        let related = embedder.embed("What do ownership rules prevent?").await.unwrap();
        let unrelated = embedder.embed("banana smoothie recipe").await.unwrap();
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
        assert!(cosine_similarity(&doc, &related) > 0.0);
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8).unwrap();
        let v = embedder.embed("  ...  ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashEmbedder::new(32).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(HashEmbedder::new(0).is_err());
    }
}
