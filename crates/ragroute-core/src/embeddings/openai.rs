//! OpenAI embeddings backend

use super::cache::{embedding_cache_key, EmbeddingCache};
use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use crate::http;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const PROVIDER: &str = "openai";
const DEFAULT_DIMENSIONS: usize = 1536;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Known output sizes of OpenAI embedding models
pub fn model_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "text-embedding-ada-002" => Some(1536),
        _ => None,
    }
}

/// Embedder calling `POST {base_url}/embeddings`
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimensions: usize,
    cache: EmbeddingCache,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RagError::config(
                    "OPENAI_API_KEY not found; it is required for embedding provider 'openai'",
                )
                .with_details(json!({ "provider": PROVIDER, "credential": "OPENAI_API_KEY" }))
            })?
            .to_string();

        let dimensions = config
            .dimensions
            .or_else(|| model_dimensions(&config.model))
            .unwrap_or(DEFAULT_DIMENSIONS);
        if dimensions == 0 {
            return Err(RagError::config("embedding dimensions must be positive"));
        }

        Ok(Self {
            http: http::client(PROVIDER, REQUEST_TIMEOUT)?,
            api_key,
            model: config.model.clone(),
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            dimensions,
            cache: EmbeddingCache::new(),
        })
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    async fn fetch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| http::transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(http::vendor_error(PROVIDER, response).await);
        }

        let mut parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| http::transport_error(PROVIDER, e))?;

        // The API documents ordering by index but does not promise it
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != texts.len() {
            return Err(http::unexpected_payload(
                PROVIDER,
                &format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            ));
        }
        if let Some(bad) = parsed
            .data
            .iter()
            .find(|d| d.embedding.len() != self.dimensions)
        {
            return Err(http::unexpected_payload(
                PROVIDER,
                &format!(
                    "embedding has {} dimensions, expected {}",
                    bad.embedding.len(),
                    self.dimensions
                ),
            ));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| http::unexpected_payload(PROVIDER, "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut uncached_texts = Vec::new();
        let mut uncached_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&embedding_cache_key(&self.model, text)) {
                Some(hit) => results.push(Some(hit)),
                None => {
                    results.push(None);
                    uncached_texts.push(text.clone());
                    uncached_indices.push(i);
                }
            }
        }

        tracing::debug!(
            "Embedding batch: {} cached, {} to fetch",
            texts.len() - uncached_texts.len(),
            uncached_texts.len()
        );

        if !uncached_texts.is_empty() {
            let fetched = self.fetch(&uncached_texts).await?;
            for ((idx, text), embedding) in uncached_indices
                .into_iter()
                .zip(&uncached_texts)
                .zip(fetched)
            {
                self.cache
                    .set(embedding_cache_key(&self.model, text), embedding.clone());
                results[idx] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| http::unexpected_payload(PROVIDER, "missing embedding")))
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        PROVIDER
    }
}
