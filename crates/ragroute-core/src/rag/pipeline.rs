//! Query pipeline

use super::context::{build_prompt, select_context, NO_CONTEXT_NOTE};
use super::{RagAnswer, RagOptions, RagRequest, SourceRef};
use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::llm::{AskOptions, CompletionStream, ModelRouter};
use crate::vectors::VectorStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Sources plus a streamed answer
pub struct RagStream {
    pub sources: Vec<SourceRef>,
    pub stream: CompletionStream,
}

/// Embeds a question, retrieves context and asks the routed model.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    router: Arc<ModelRouter>,
    options: RagOptions,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        router: Arc<ModelRouter>,
        options: RagOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            router,
            options,
        }
    }

    pub fn options(&self) -> RagOptions {
        self.options
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    /// Answer a question from stored context
    pub async fn query(&self, request: &RagRequest) -> Result<RagAnswer> {
        request.validate()?;
        with_deadline(request, self.run(request)).await
    }

    /// Like [`query`](Self::query), but the answer is streamed.
    ///
    /// The timeout covers retrieval and opening the stream.
    pub async fn query_stream(&self, request: &RagRequest) -> Result<RagStream> {
        request.validate()?;
        with_deadline(request, async {
            let (sources, prompt, options) = self.prepare(request).await?;
            let stream = self
                .router
                .stream(&prompt, &options, request.provider.as_deref())
                .await?;
            Ok(RagStream { sources, stream })
        })
        .await
    }

    async fn run(&self, request: &RagRequest) -> Result<RagAnswer> {
        let started = Instant::now();
        let (sources, prompt, options) = self.prepare(request).await?;

        let response = self
            .router
            .ask(&prompt, &options, request.provider.as_deref())
            .await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            provider = %response.provider,
            model = %response.model,
            sources = sources.len(),
            latency_ms,
            "rag query completed"
        );

        Ok(RagAnswer {
            answer: response.content,
            sources,
            model: response.model,
            provider: response.provider,
            usage: response.usage,
            finish_reason: response.finish_reason,
            latency_ms,
        })
    }

    /// Embed, retrieve and build the prompt
    async fn prepare(&self, request: &RagRequest) -> Result<(Vec<SourceRef>, String, AskOptions)> {
        let embedding = self.embedder.embed(&request.question).await?;

        let top_k = request.top_k.unwrap_or(self.options.top_k);
        let results = self
            .store
            .search_filtered(&embedding, top_k, &request.filter)
            .await?;
        let retrieved = results.len();

        let sources = select_context(
            results.into_iter().map(SourceRef::from).collect(),
            self.options.context_window,
        );
        tracing::debug!(
            retrieved,
            in_context = sources.len(),
            top_k,
            "retrieved context"
        );

        let prompt = build_prompt(
            &request.question,
            &sources,
            request.system_prompt.as_deref(),
        );
        let note = sources.is_empty().then_some(NO_CONTEXT_NOTE);
        if note.is_some() {
            tracing::debug!("no relevant context found; asking without grounding");
        }
        Ok((sources, prompt, request.sampling(note)))
    }
}

/// Apply the request's timeout; expiry drops the in-flight future
async fn with_deadline<T>(
    request: &RagRequest,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match request.timeout {
        Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
            tracing::warn!(timeout = ?limit, "rag query timed out");
            RagError::Timeout(limit)
        })?,
        None => work.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::embeddings::HashEmbedder;
    use crate::vectors::{LocalVectorStore, Metadata, MetadataFilter, NewRecord};
    use async_trait::async_trait;
    use futures::StreamExt;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn router(base_url: &str) -> Arc<ModelRouter> {
        let mut config = LlmConfig::default();
        config.provider = "openai".into();
        config.openai.api_key = Some("sk-test".into());
        config.openai.base_url = base_url.to_string();
        Arc::new(ModelRouter::new(config))
    }

    async fn pipeline(base_url: &str, texts: &[(&str, &str)]) -> RagPipeline {
        let embedder = Arc::new(HashEmbedder::new(64).unwrap());
        let store = Arc::new(LocalVectorStore::in_memory(64).unwrap());
        let mut records = Vec::new();
        for (doc, text) in texts {
            let mut metadata = Metadata::new();
            metadata.insert("document_id".into(), json!(doc));
            records.push(NewRecord::new(embedder.embed(text).await.unwrap(), *text, metadata));
        }
        if !records.is_empty() {
            store.add(records).await.unwrap();
        }
        RagPipeline::new(embedder, store, router(base_url), RagOptions::default())
    }

    fn completion(content: &str) -> String {
        json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 30, "completion_tokens": 5, "total_tokens": 35}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_query_returns_grounded_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("Rust guarantees memory safety".into()))
            .with_status(200)
            .with_body(completion("It uses ownership."))
            .create_async()
            .await;

        let pipeline = pipeline(
            &server.url(),
            &[
                ("doc-a", "Rust guarantees memory safety through ownership."),
                ("doc-b", "Bananas are rich in potassium."),
            ],
        )
        .await;

        let answer = pipeline
            .query(&RagRequest::new("How does Rust guarantee memory safety?").with_top_k(1))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(answer.answer, "It uses ownership.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].document_id.as_deref(), Some("doc-a"));
        assert!(answer.sources[0].score > 0.0);
        assert_eq!(answer.tokens_used(), Some(35));
    }

    #[tokio::test]
    async fn test_empty_store_still_calls_model_with_note() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("No relevant context found".into()))
            .with_status(200)
            .with_body(completion("I don't know."))
            .expect(1)
            .create_async()
            .await;

        let pipeline = pipeline(&server.url(), &[]).await;
        let answer = pipeline.query(&RagRequest::new("Anything?")).await.unwrap();

        mock.assert_async().await;
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn test_filter_restricts_sources() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("ok"))
            .create_async()
            .await;

        let pipeline = pipeline(
            &server.url(),
            &[("doc-a", "alpha beta"), ("doc-b", "alpha gamma")],
        )
        .await;
        let request = RagRequest::new("alpha")
            .with_filter(MetadataFilter::new().with("document_id", "doc-b"));
        let answer = pipeline.query(&request).await.unwrap();

        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].document_id.as_deref(), Some("doc-b"));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#)
            .create_async()
            .await;

        let pipeline = pipeline(&server.url(), &[("doc-a", "text")]).await;
        let err = pipeline.query(&RagRequest::new("q")).await.unwrap_err();
        assert!(matches!(err, RagError::Provider { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_model() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let pipeline = pipeline(&server.url(), &[]).await;
        let err = pipeline
            .query(&RagRequest::new("q").with_temperature(3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
        mock.assert_async().await;
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]; texts.len()])
        }

        fn dimensions(&self) -> usize {
            1
        }

        fn model_name(&self) -> &str {
            "slow"
        }

        fn provider(&self) -> &str {
            "test"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_query() {
        let pipeline = RagPipeline::new(
            Arc::new(SlowEmbedder),
            Arc::new(LocalVectorStore::in_memory(1).unwrap()),
            router("http://127.0.0.1:9"),
            RagOptions::default(),
        );
        let err = pipeline
            .query(&RagRequest::new("q").with_timeout(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_query_stream_yields_sources_and_fragments() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Own\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ership\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("\"stream\":true".into()))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let pipeline = pipeline(&server.url(), &[("doc-a", "ownership rules")]).await;
        let mut result = pipeline
            .query_stream(&RagRequest::new("ownership"))
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 1);
        let mut text = String::new();
        while let Some(fragment) = result.stream.next().await {
            text.push_str(&fragment.unwrap());
        }
        assert_eq!(text, "Ownership");
    }
}
