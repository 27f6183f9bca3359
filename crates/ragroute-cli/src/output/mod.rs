//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use ragroute_core::RagError;

/// Print a library error to stderr in the selected format
pub fn print_error(err: &RagError, format: OutputFormat) {
    match format {
        OutputFormat::Json => eprint!("{}", json::format_value(&err.report())),
        OutputFormat::Cli => {
            eprintln!("Error: {}", err);
            if let serde_json::Value::Object(details) = err.details() {
                for (key, value) in details {
                    eprintln!("  {}: {}", key, value);
                }
            }
        }
    }
}
