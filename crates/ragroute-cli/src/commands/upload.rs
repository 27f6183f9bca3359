//! Upload command

use crate::app::{OutputFormat, UploadArgs};
use crate::output::json;
use anyhow::{Context, Result};
use ragroute_core::vectors::Metadata;
use ragroute_core::{Config, RagService};
use serde_json::Value;

pub async fn run(args: UploadArgs, config: Config, format: OutputFormat) -> Result<()> {
    let service = RagService::from_config(config)?;
    let extra: Metadata = args
        .metadata
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let mut outcomes = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let outcome = service.upload_document(&filename, &bytes, &extra).await?;
        if format == OutputFormat::Cli {
            println!(
                "Uploaded {} ({} chunks) #{}",
                filename, outcome.chunks, outcome.document.id
            );
        }
        outcomes.push(outcome);
    }

    if format == OutputFormat::Json {
        print!("{}", json::format_value(&outcomes));
    }
    Ok(())
}
