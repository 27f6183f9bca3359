//! Anthropic messages adapter

use super::openai::missing_credential;
use super::stream::{event_json, fragments, CompletionStream, SseDecoder};
use super::traits::ModelClient;
use super::types::{usage_from_json, AskOptions, Message, ModelResponse};
use crate::config::ProviderSettings;
use crate::error::{RagError, Result, GENERIC_PROVIDER_STATUS};
use crate::http;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const PROVIDER: &str = "anthropic";
pub const CREDENTIAL_ENV: &str = "ANTHROPIC_API_KEY";
pub const API_VERSION: &str = "2023-06-01";

/// The messages API rejects requests without `max_tokens`
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Client for `POST {base_url}/messages`
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl AnthropicClient {
    pub fn new(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        let api_key = settings
            .credential()
            .ok_or_else(|| missing_credential(PROVIDER, CREDENTIAL_ENV))?
            .to_string();
        Self::with_api_key(settings, api_key, timeout)
    }

    pub fn with_api_key(
        settings: &ProviderSettings,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(missing_credential(PROVIDER, CREDENTIAL_ENV));
        }
        Ok(Self {
            http: http::client(PROVIDER, timeout)?,
            api_key,
            model: settings.model.clone(),
            endpoint: format!("{}/messages", settings.base_url.trim_end_matches('/')),
        })
    }

    /// System prompt travels as a top-level field, not as a message
    fn request_body(&self, prompt: &str, options: &AskOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature,
            "messages": [Message::user(prompt)],
        });
        if let Some(system) = &options.system_prompt {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| http::transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(http::vendor_error(PROVIDER, response).await);
        }
        Ok(response)
    }

    fn parse_response(&self, body: &Value) -> Result<ModelResponse> {
        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| http::unexpected_payload(PROVIDER, "missing content blocks"))?;
        let texts: Vec<&str> = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();
        if texts.is_empty() {
            return Err(http::unexpected_payload(PROVIDER, "no text content block"));
        }

        Ok(ModelResponse {
            content: texts.concat(),
            model: body["model"].as_str().unwrap_or(&self.model).to_string(),
            provider: PROVIDER.to_string(),
            usage: usage_from_json(&body["usage"]),
            finish_reason: body["stop_reason"].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ask(&self, prompt: &str, options: &AskOptions) -> Result<ModelResponse> {
        options.validate()?;
        tracing::debug!(model = %self.model, "anthropic completion request");

        let response = self.send(&self.request_body(prompt, options, false)).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| http::transport_error(PROVIDER, e))?;
        self.parse_response(&body)
    }

    async fn stream(&self, prompt: &str, options: &AskOptions) -> Result<CompletionStream> {
        options.validate()?;
        tracing::debug!(model = %self.model, "anthropic streaming request");

        let response = self.send(&self.request_body(prompt, options, true)).await?;
        let decoder = SseDecoder::new(PROVIDER, response.bytes_stream())
            .with_terminal_event("message_stop");
        let text = fragments(decoder, |event| {
            let payload = event_json(PROVIDER, event)?;
            match payload["type"].as_str() {
                Some("content_block_delta") => Ok(payload["delta"]["text"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)),
                Some("error") => {
                    let err = &payload["error"];
                    let message = err["message"].as_str().unwrap_or("stream error");
                    Err(
                        RagError::provider(PROVIDER, GENERIC_PROVIDER_STATUS, message)
                            .with_details(json!({ "error_type": err["type"] })),
                    )
                }
                _ => Ok(None),
            }
        });

        Ok(CompletionStream::new(PROVIDER, self.model.clone(), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn settings(base_url: &str) -> ProviderSettings {
        ProviderSettings {
            api_key: Some("sk-ant".to_string()),
            base_url: base_url.to_string(),
            ..ProviderSettings::anthropic()
        }
    }

    #[test]
    fn test_system_prompt_is_top_level_and_max_tokens_defaults() {
        let client = AnthropicClient::new(&settings("http://x"), Duration::from_secs(1)).unwrap();
        let body = client.request_body(
            "hi",
            &AskOptions::default().with_system_prompt("sys"),
            false,
        );
        assert_eq!(body["system"], "sys");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_missing_key_names_credential() {
        let mut s = settings("http://x");
        s.api_key = None;
        let err = AnthropicClient::new(&s, Duration::from_secs(1)).err().unwrap();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
        assert_eq!(err.details()["provider"], "anthropic");
    }

    #[tokio::test]
    async fn test_ask_maps_usage_and_stop_reason() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "sk-ant")
            .match_header("anthropic-version", API_VERSION)
            .with_status(200)
            .with_body(
                r#"{"model":"claude-3-haiku-20240307","content":[{"type":"text","text":"Paris"}],
                    "stop_reason":"end_turn","usage":{"input_tokens":9,"output_tokens":2}}"#,
            )
            .create_async()
            .await;

        let client = AnthropicClient::new(&settings(&server.url()), Duration::from_secs(5)).unwrap();
        let response = client.ask("q", &AskOptions::default()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "Paris");
        assert_eq!(response.provider, "anthropic");
        assert_eq!(response.usage["input_tokens"], 9);
        assert_eq!(response.usage["output_tokens"], 2);
        assert_eq!(response.total_tokens(), Some(11));
        assert_eq!(response.finish_reason.as_deref(), Some("end_turn"));
    }

    #[tokio::test]
    async fn test_stream_surfaces_error_event() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: error\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n"
        );
        server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = AnthropicClient::new(&settings(&server.url()), Duration::from_secs(5)).unwrap();
        let mut stream = client.stream("q", &AskOptions::default()).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "Hi");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
        assert!(stream.next().await.is_none());
    }

    const DELTA: &str = concat!(
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bonjour \u{e0} tous\"}}\n\n",
    );

    #[tokio::test]
    async fn test_stream_ends_at_message_stop() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(
            "{}event: message_stop\ndata: {{\"type\":\"message_stop\"}}\n\n",
            DELTA
        );
        server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = AnthropicClient::new(&settings(&server.url()), Duration::from_secs(5)).unwrap();
        let text = client
            .stream("q", &AskOptions::default())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "Bonjour \u{e0} tous");
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(DELTA)
            .create_async()
            .await;

        let client = AnthropicClient::new(&settings(&server.url()), Duration::from_secs(5)).unwrap();
        let mut stream = client.stream("q", &AskOptions::default()).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "Bonjour \u{e0} tous");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, RagError::Provider { .. }));
        assert!(stream.next().await.is_none());
    }
}
