//! JSON output formatter

use serde::Serialize;

/// Pretty JSON with a trailing newline
pub fn format_value<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string()) + "\n"
}
