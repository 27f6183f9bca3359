//! Model client trait definition

use super::stream::CompletionStream;
use super::types::{AskOptions, ModelResponse};
use crate::error::Result;
use async_trait::async_trait;

/// Uniform contract every language-model backend satisfies
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider identifier, e.g. `openai`
    fn provider(&self) -> &str;

    /// Model used for completions
    fn model_name(&self) -> &str;

    /// Single completion
    async fn ask(&self, prompt: &str, options: &AskOptions) -> Result<ModelResponse>;

    /// Streamed completion as a lazy sequence of text fragments
    async fn stream(&self, prompt: &str, options: &AskOptions) -> Result<CompletionStream>;
}
