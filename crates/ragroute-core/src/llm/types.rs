//! Provider-neutral request and response types

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Chat role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message sent to a vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Sampling parameters shared by every provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskOptions {
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

impl AskOptions {
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

    /// Reject parameters no vendor accepts
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(
                RagError::validation("temperature must be between 0 and 2")
                    .with_details(json!({ "field": "temperature", "value": self.temperature })),
            );
        }
        if self.max_tokens == Some(0) {
            return Err(RagError::validation("max_tokens must be positive")
                .with_details(json!({ "field": "max_tokens", "value": 0 })));
        }
        Ok(())
    }
}

/// Token accounting with the vendor's own key names
pub type Usage = BTreeMap<String, u64>;

/// Flatten a vendor usage object into a [`Usage`] map.
///
/// Nested objects are kept with dotted keys
/// (`prompt_tokens_details.cached_tokens`); non-numeric fields are dropped.
pub fn usage_from_json(value: &Value) -> Usage {
    let mut usage = Usage::new();
    flatten_usage("", value, &mut usage);
    usage
}

fn flatten_usage(prefix: &str, value: &Value, out: &mut Usage) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_usage(&name, inner, out);
            }
        }
        Value::Number(n) if !prefix.is_empty() => {
            if let Some(v) = n.as_u64() {
                out.insert(prefix.to_string(), v);
            }
        }
        _ => {}
    }
}

/// Normalized completion result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
    pub provider: String,
    #[serde(default)]
    pub usage: Usage,
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    pub fn total_tokens(&self) -> Option<u64> {
        total_tokens(&self.usage)
    }
}

/// Total tokens, whichever naming the vendor used
pub fn total_tokens(usage: &Usage) -> Option<u64> {
    if let Some(total) = usage.get("total_tokens") {
        return Some(*total);
    }
    let pair = |a: &str, b: &str| match (usage.get(a), usage.get(b)) {
        (None, None) => None,
        (x, y) => Some(x.copied().unwrap_or(0) + y.copied().unwrap_or(0)),
    };
    pair("prompt_tokens", "completion_tokens").or_else(|| pair("input_tokens", "output_tokens"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_temperature_bounds() {
        assert!(AskOptions::default().validate().is_ok());
        assert!(AskOptions::default().with_temperature(2.0).validate().is_ok());
        let err = AskOptions::default()
            .with_temperature(2.5)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
        assert!(AskOptions::default()
            .with_temperature(f32::NAN)
            .validate()
            .is_err());
        assert!(AskOptions::default().with_max_tokens(0).validate().is_err());
    }

    #[test]
    fn test_usage_keeps_both_key_sets() {
        let openai = usage_from_json(&json!({
            "prompt_tokens": 10,
            "completion_tokens": 5,
            "total_tokens": 15,
            "prompt_tokens_details": { "cached_tokens": 2 }
        }));
        assert_eq!(openai["prompt_tokens_details.cached_tokens"], 2);

        let anthropic = usage_from_json(&json!({ "input_tokens": 7, "output_tokens": 3 }));
        let response = ModelResponse {
            content: String::new(),
            model: "m".into(),
            provider: "anthropic".into(),
            usage: anthropic,
            finish_reason: None,
        };
        assert_eq!(response.total_tokens(), Some(10));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = serde_json::to_value(Message::system("hi")).unwrap();
        assert_eq!(msg["role"], "system");
    }
}
