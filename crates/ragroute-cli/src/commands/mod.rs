//! CLI command handlers

pub mod ask;
pub mod config;
pub mod documents;
pub mod eval;
pub mod filings;
pub mod history;
pub mod query;
pub mod status;
pub mod upload;

use crate::app::SamplingArgs;
use anyhow::Result;
use futures::StreamExt;
use ragroute_core::llm::CompletionStream;
use ragroute_core::{AskOptions, Config, Database};
use std::io::Write;

impl SamplingArgs {
    pub fn options(&self) -> AskOptions {
        AskOptions {
            system_prompt: self.system.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Metadata database named by the configuration
pub fn open_database(config: &Config) -> Result<Database> {
    let db = Database::open(&config.database_path)?;
    db.initialize()?;
    Ok(db)
}

/// Echo fragments to stdout as they arrive and return the full text
pub async fn print_stream(mut stream: CompletionStream, echo: bool) -> Result<String> {
    let mut text = String::new();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if echo {
            write!(stdout, "{}", fragment)?;
            stdout.flush()?;
        }
        text.push_str(&fragment);
    }
    if echo {
        writeln!(stdout)?;
    }
    Ok(text)
}
