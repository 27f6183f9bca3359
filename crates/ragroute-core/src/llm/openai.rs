//! OpenAI chat completions adapter

use super::stream::{event_json, fragments, CompletionStream, SseDecoder};
use super::traits::ModelClient;
use super::types::{usage_from_json, AskOptions, Message, ModelResponse};
use crate::config::ProviderSettings;
use crate::error::{RagError, Result, GENERIC_PROVIDER_STATUS};
use crate::http;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

pub const PROVIDER: &str = "openai";
pub const CREDENTIAL_ENV: &str = "OPENAI_API_KEY";

/// Client for `POST {base_url}/chat/completions`
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    /// Create from settings; fails before any network call without a key
    pub fn new(settings: &ProviderSettings, timeout: Duration) -> Result<Self> {
        let api_key = settings
            .credential()
            .ok_or_else(|| missing_credential(PROVIDER, CREDENTIAL_ENV))?
            .to_string();
        Self::with_api_key(settings, api_key, timeout)
    }

    /// Create with an explicit key instead of the configured one
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
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
        })
    }

    fn request_body(&self, prompt: &str, options: &AskOptions, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(prompt));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
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
            .bearer_auth(&self.api_key)
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
        let choice = body["choices"]
            .get(0)
            .ok_or_else(|| http::unexpected_payload(PROVIDER, "no choices"))?;
        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| http::unexpected_payload(PROVIDER, "choice has no message content"))?;

        Ok(ModelResponse {
            content: content.to_string(),
            model: body["model"].as_str().unwrap_or(&self.model).to_string(),
            provider: PROVIDER.to_string(),
            usage: usage_from_json(&body["usage"]),
            finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ask(&self, prompt: &str, options: &AskOptions) -> Result<ModelResponse> {
        options.validate()?;
        tracing::debug!(model = %self.model, "openai completion request");

        let response = self.send(&self.request_body(prompt, options, false)).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| http::transport_error(PROVIDER, e))?;
        self.parse_response(&body)
    }

    async fn stream(&self, prompt: &str, options: &AskOptions) -> Result<CompletionStream> {
        options.validate()?;
        tracing::debug!(model = %self.model, "openai streaming request");

        let response = self.send(&self.request_body(prompt, options, true)).await?;
        let decoder = SseDecoder::new(PROVIDER, response.bytes_stream());
        let text = fragments(decoder, |event| {
            let payload = event_json(PROVIDER, event)?;
            if let Some(err) = payload.get("error") {
                let message = err["message"].as_str().unwrap_or("stream error");
                return Err(RagError::provider(PROVIDER, GENERIC_PROVIDER_STATUS, message)
                    .with_details(json!({ "error_type": err["type"] })));
            }
            Ok(payload["choices"][0]["delta"]["content"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string))
        });

        Ok(CompletionStream::new(PROVIDER, self.model.clone(), text))
    }
}

pub(crate) fn missing_credential(provider: &str, env: &str) -> RagError {
    RagError::config(format!(
        "{} not found; it is required for provider '{}'",
        env, provider
    ))
    .with_details(json!({ "provider": provider, "credential": env }))
}
