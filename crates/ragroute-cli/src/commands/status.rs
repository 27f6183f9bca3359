//! Status command

use crate::app::OutputFormat;
use crate::output::json;
use anyhow::Result;
use ragroute_core::{Config, RagService};

pub async fn run(config: Config, format: OutputFormat) -> Result<()> {
    let service = RagService::from_config(config)?;
    let stats = service.stats().await?;

    match format {
        OutputFormat::Json => print!("{}", json::format_value(&stats)),
        OutputFormat::Cli => {
            println!("Documents:       {}", stats.documents);
            println!("Vectors:         {}", stats.vectors);
            println!("Queries:         {}", stats.queries);
            println!();
            println!("Vector store:    {}", stats.vector_backend);
            println!(
                "Embeddings:      {} {} ({} dims)",
                stats.embedding_provider, stats.embedding_model, stats.dimensions
            );
        }
    }
    Ok(())
}
