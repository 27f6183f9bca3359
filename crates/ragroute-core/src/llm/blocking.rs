//! Blocking facade for callers without an async runtime
//!
//! Must not be used from inside a tokio runtime.

use super::stream::CompletionStream;
use super::traits::ModelClient;
use super::types::{AskOptions, ModelResponse};
use crate::error::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// Synchronous wrapper around a [`ModelClient`]
pub struct BlockingClient {
    inner: Arc<dyn ModelClient>,
    runtime: Runtime,
}

impl BlockingClient {
    pub fn new(inner: Arc<dyn ModelClient>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn provider(&self) -> &str {
        self.inner.provider()
    }

    pub fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    pub fn ask(&self, prompt: &str, options: &AskOptions) -> Result<ModelResponse> {
        self.runtime.block_on(self.inner.ask(prompt, options))
    }

    pub fn stream(&self, prompt: &str, options: &AskOptions) -> Result<BlockingStream<'_>> {
        let stream = self.runtime.block_on(self.inner.stream(prompt, options))?;
        Ok(BlockingStream {
            runtime: &self.runtime,
            stream,
        })
    }
}

/// Iterator over streamed fragments; dropping it releases the transport
pub struct BlockingStream<'a> {
    runtime: &'a Runtime,
    stream: CompletionStream,
}

impl BlockingStream<'_> {
    pub fn close(&mut self) {
        self.stream.close();
    }
}

impl Iterator for BlockingStream<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.stream.next())
    }
}
