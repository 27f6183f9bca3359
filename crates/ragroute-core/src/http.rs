//! Shared HTTP plumbing for vendor and registry calls

use crate::error::{RagError, Result, GENERIC_PROVIDER_STATUS};
use serde_json::{json, Value};
use std::time::Duration;

/// Build a reqwest client with the given request timeout
pub(crate) fn client(provider: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| transport_error(provider, e))
}

/// Map a transport-level failure (connect, timeout, body read) to a provider error
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> RagError {
    let error_type = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection"
    } else if err.is_decode() {
        "decode"
    } else {
        "transport"
    };
    let status = err
        .status()
        .map(|s| s.as_u16())
        .unwrap_or(GENERIC_PROVIDER_STATUS);
    RagError::provider(provider, status, format!("request failed: {}", err))
        .with_details(json!({ "error_type": error_type }))
}

/// Turn a non-success vendor response into a provider error, keeping the
/// vendor's own error type and message when the body carries them
pub(crate) async fn vendor_error(provider: &str, response: reqwest::Response) -> RagError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<Value> = serde_json::from_str(&body).ok();

    let (message, error_type) = match parsed.as_ref().map(|v| &v["error"]) {
        Some(Value::Object(err)) => (
            err.get("message")
                .and_then(Value::as_str)
                .unwrap_or("vendor error")
                .to_string(),
            err.get("type").and_then(Value::as_str).map(str::to_string),
        ),
        Some(Value::String(msg)) => (msg.clone(), None),
        _ => (truncate(&body, 500), None),
    };

    tracing::warn!(provider, status, "vendor request failed: {}", message);

    RagError::provider(provider, status, format!("HTTP {}: {}", status, message))
        .with_details(json!({ "error_type": error_type }))
}

/// Error for a 2xx response whose payload does not have the expected shape
pub(crate) fn unexpected_payload(provider: &str, what: &str) -> RagError {
    RagError::provider(
        provider,
        GENERIC_PROVIDER_STATUS,
        format!("unexpected response payload: {}", what),
    )
    .with_details(json!({ "error_type": "invalid_response" }))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_vendor_error_extracts_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fail")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API key","type":"authentication_error"}}"#)
            .create_async()
            .await;

        let response = reqwest::get(format!("{}/fail", server.url())).await.unwrap();
        let err = vendor_error("openai", response).await;

        mock.assert_async().await;
        match &err {
            RagError::Provider {
                provider, status, ..
            } => {
                assert_eq!(provider, "openai");
                assert_eq!(*status, 401);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("Invalid API key"));
        assert_eq!(err.details()["error_type"], "authentication_error");
    }
}
