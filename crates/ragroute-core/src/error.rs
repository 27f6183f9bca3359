//! Error types for ragroute

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using RagError
pub type Result<T> = std::result::Result<T, RagError>;

/// Error type alias for convenience
pub type Error = RagError;

/// Status reported for vendor failures that carry no HTTP status of their own
pub const GENERIC_PROVIDER_STATUS: u16 = 500;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
}

/// Main error type for ragroute
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Configuration error: {message}")]
    Configuration { message: String, details: Value },

    #[error("[{provider}] {message}")]
    Provider {
        provider: String,
        status: u16,
        message: String,
        details: Value,
    },

    #[error("Validation error: {message}")]
    Validation { message: String, details: Value },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Provider,
    Validation,
    NotFound,
    Timeout,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Provider => "provider_error",
            Self::Validation => "validation_error",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Storage => "storage_error",
            Self::Internal => "internal_error",
        }
    }
}

/// Caller-facing error description: kind, message and structured details
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    pub details: Value,
}

impl RagError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn provider(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Attach structured details to a configuration, provider or validation error
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            Self::Configuration { details, .. }
            | Self::Provider { details, .. }
            | Self::Validation { details, .. } => *details = value,
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::Yaml(_) => ErrorKind::Configuration,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Database(_) | Self::Io(_) => ErrorKind::Storage,
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Structured details suitable for machine consumption
    pub fn details(&self) -> Value {
        match self {
            Self::Configuration { details, .. } | Self::Validation { details, .. } => {
                details.clone()
            }
            Self::Provider {
                provider,
                status,
                details,
                ..
            } => {
                let mut out = json!({ "provider": provider, "status_code": status });
                if let (Some(map), Value::Object(extra)) = (out.as_object_mut(), details) {
                    for (k, v) in extra {
                        map.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                out
            }
            Self::NotFound(what) => json!({ "resource": what }),
            Self::Timeout(after) => json!({ "timeout_ms": after.as_millis() as u64 }),
            _ => Value::Null,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().as_str(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotFound => exit_codes::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::Configuration => exit_codes::INVALID_INPUT,
            _ => exit_codes::GENERAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_details_include_provider_and_status() {
        let err = RagError::provider("openai", 429, "rate limited")
            .with_details(json!({ "error_type": "rate_limit_error" }));
        let details = err.details();
        assert_eq!(details["provider"], "openai");
        assert_eq!(details["status_code"], 429);
        assert_eq!(details["error_type"], "rate_limit_error");
        assert_eq!(err.to_string(), "[openai] rate limited");
    }

    #[test]
    fn test_report_kind_names() {
        assert_eq!(RagError::config("x").report().kind, "configuration_error");
        assert_eq!(RagError::validation("x").report().kind, "validation_error");
        assert_eq!(RagError::not_found("doc").report().kind, "not_found");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RagError::not_found("x").exit_code(), exit_codes::NOT_FOUND);
        assert_eq!(RagError::config("x").exit_code(), exit_codes::INVALID_INPUT);
        assert_eq!(
            RagError::provider("anthropic", 500, "boom").exit_code(),
            exit_codes::GENERAL_ERROR
        );
    }
}
