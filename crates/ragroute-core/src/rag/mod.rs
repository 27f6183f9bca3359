//! Retrieval-augmented generation
//!
//! One pass per question: embed, retrieve, assemble context, generate.
//! No step is retried; failures surface to the caller unchanged.

mod context;
mod pipeline;

pub use context::{build_prompt, select_context, DEFAULT_INSTRUCTION, NO_CONTEXT_NOTE};
pub use pipeline::{RagPipeline, RagStream};

use crate::config::RetrievalConfig;
use crate::error::{RagError, Result};
use crate::llm::{total_tokens, AskOptions, Usage, DEFAULT_TEMPERATURE};
use crate::vectors::{Metadata, MetadataFilter, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline-wide retrieval settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RagOptions {
    /// Records requested from the vector store
    pub top_k: usize,
    /// Maximum context size in characters
    pub context_window: usize,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RagOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            context_window: config.context_window,
        }
    }
}

/// One question and its per-request overrides
#[derive(Debug, Clone)]
pub struct RagRequest {
    pub question: String,
    /// Replaces the default answering instruction
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Provider name; the router default when `None`
    pub provider: Option<String>,
    /// Overrides [`RagOptions::top_k`]
    pub top_k: Option<usize>,
    pub filter: MetadataFilter,
    /// Bound on the whole invocation
    pub timeout: Option<Duration>,
}

impl RagRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            provider: None,
            top_k: None,
            filter: MetadataFilter::default(),
            timeout: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Input checks that must pass before any embedding call
    pub(crate) fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(RagError::validation("question must not be empty"));
        }
        if self.top_k == Some(0) {
            return Err(RagError::validation("top_k must be positive"));
        }
        self.filter.validate()?;
        self.sampling(None).validate()
    }

    fn sampling(&self, system_prompt: Option<&str>) -> AskOptions {
        AskOptions {
            system_prompt: system_prompt.map(str::to_string),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// A retrieved chunk that was placed in the model's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Vector record id
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
    pub document_id: Option<String>,
    pub chunk_index: Option<usize>,
}

impl From<RetrievalResult> for SourceRef {
    fn from(result: RetrievalResult) -> Self {
        let document_id = result
            .metadata
            .get("document_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let chunk_index = result
            .metadata
            .get("chunk_index")
            .and_then(|v| v.as_u64())
            .map(|i| i as usize);
        Self {
            id: result.id,
            score: result.score,
            text: result.text,
            metadata: result.metadata,
            document_id,
            chunk_index,
        }
    }
}

/// Grounded answer with its sources, in similarity order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub model: String,
    pub provider: String,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    /// Wall-clock time from embedding to generated answer
    pub latency_ms: u64,
}

impl RagAnswer {
    pub fn tokens_used(&self) -> Option<u64> {
        total_tokens(&self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_validation() {
        assert!(RagRequest::new("  ").validate().is_err());
        assert!(RagRequest::new("q").with_top_k(0).validate().is_err());
        assert!(RagRequest::new("q").with_temperature(2.5).validate().is_err());
        assert!(RagRequest::new("q").with_max_tokens(0).validate().is_err());
        assert!(RagRequest::new("q").with_top_k(3).validate().is_ok());
    }

    #[test]
    fn test_source_ref_reads_chunk_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("document_id".into(), json!("doc-1"));
        metadata.insert("chunk_index".into(), json!(4));
        let source = SourceRef::from(RetrievalResult {
            id: "doc-1_chunk_4".into(),
            text: "text".into(),
            metadata,
            score: 0.5,
        });
        assert_eq!(source.document_id.as_deref(), Some("doc-1"));
        assert_eq!(source.chunk_index, Some(4));
    }
}
