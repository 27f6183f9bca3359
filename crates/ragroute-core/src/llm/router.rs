//! Provider selection and client caching

use super::anthropic::{self, AnthropicClient};
use super::openai::{self, OpenAiClient};
use super::stream::CompletionStream;
use super::traits::ModelClient;
use super::types::{AskOptions, ModelResponse};
use crate::config::{LlmConfig, ProviderSettings};
use crate::error::{RagError, Result};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Supported language-model vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => openai::PROVIDER,
            Provider::Anthropic => anthropic::PROVIDER,
        }
    }

    /// Environment variable holding this provider's key
    pub fn credential_env(&self) -> &'static str {
        match self {
            Provider::OpenAi => openai::CREDENTIAL_ENV,
            Provider::Anthropic => anthropic::CREDENTIAL_ENV,
        }
    }

    pub fn settings<'a>(&self, config: &'a LlmConfig) -> &'a ProviderSettings {
        match self {
            Provider::OpenAi => &config.openai,
            Provider::Anthropic => &config.anthropic,
        }
    }

    /// Construct a client, using `api_key` in place of the configured key if given
    fn build(&self, config: &LlmConfig, api_key: Option<&str>) -> Result<Arc<dyn ModelClient>> {
        let settings = self.settings(config);
        let timeout = Duration::from_secs(config.timeout_secs);
        let client: Arc<dyn ModelClient> = match (self, api_key) {
            (Provider::OpenAi, None) => Arc::new(OpenAiClient::new(settings, timeout)?),
            (Provider::OpenAi, Some(key)) => {
                Arc::new(OpenAiClient::with_api_key(settings, key, timeout)?)
            }
            (Provider::Anthropic, None) => Arc::new(AnthropicClient::new(settings, timeout)?),
            (Provider::Anthropic, Some(key)) => {
                Arc::new(AnthropicClient::with_api_key(settings, key, timeout)?)
            }
        };
        Ok(client)
    }

    pub fn supported() -> Vec<&'static str> {
        Self::ALL.iter().map(Provider::as_str).collect()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| {
                RagError::config(format!(
                    "Unsupported LLM provider: '{}'. Supported providers: {}",
                    s,
                    Self::supported().join(", ")
                ))
                .with_details(json!({
                    "provider": s,
                    "supported_providers": Self::supported(),
                }))
            })
    }
}

/// Selects a [`ModelClient`] by provider name.
///
/// Holds at most one cached client: asking for the cached provider again
/// returns the same instance, asking for another one replaces it.
pub struct ModelRouter {
    config: LlmConfig,
    cached: Mutex<Option<(Provider, Arc<dyn ModelClient>)>>,
}

impl ModelRouter {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Provider used when a request does not name one
    pub fn default_provider(&self) -> Result<Provider> {
        self.config.provider.parse()
    }

    fn resolve(&self, provider: Option<&str>) -> Result<Provider> {
        match provider {
            Some(name) if !name.trim().is_empty() => name.parse(),
            _ => self.default_provider(),
        }
    }

    /// Cached client for `provider` (or the default provider)
    pub fn client(&self, provider: Option<&str>) -> Result<Arc<dyn ModelClient>> {
        let provider = self.resolve(provider)?;
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());

        if let Some((current, client)) = cached.as_ref() {
            if *current == provider {
                return Ok(client.clone());
            }
        }

        let client = provider.build(&self.config, None)?;
        tracing::info!(
            provider = %provider,
            model = client.model_name(),
            "initialized model client"
        );
        *cached = Some((provider, client.clone()));
        Ok(client)
    }

    /// Uncached client using a caller-supplied key; the cache is left untouched
    pub fn client_with_key(
        &self,
        provider: Option<&str>,
        api_key: &str,
    ) -> Result<Arc<dyn ModelClient>> {
        let provider = self.resolve(provider)?;
        provider.build(&self.config, Some(api_key))
    }

    /// Drop the cached client so the next request re-validates configuration
    pub fn reset_client(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if cached.take().is_some() {
            tracing::debug!("model client cache cleared");
        }
    }

    /// Provider of the cached client, if any
    pub fn cached_provider(&self) -> Option<Provider> {
        let cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        cached.as_ref().map(|(p, _)| *p)
    }

    pub async fn ask(
        &self,
        prompt: &str,
        options: &AskOptions,
        provider: Option<&str>,
    ) -> Result<ModelResponse> {
        options.validate()?;
        let client = self.client(provider)?;
        client.ask(prompt, options).await
    }

    pub async fn stream(
        &self,
        prompt: &str,
        options: &AskOptions,
        provider: Option<&str>,
    ) -> Result<CompletionStream> {
        options.validate()?;
        let client = self.client(provider)?;
        client.stream(prompt, options).await
    }
}
