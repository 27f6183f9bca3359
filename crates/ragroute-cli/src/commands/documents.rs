//! Document management commands

use super::open_database;
use crate::app::{DocumentsAction, DocumentsArgs, OutputFormat};
use crate::output::{json, terminal};
use anyhow::Result;
use ragroute_core::{Config, DocumentStatus, RagService};
use serde_json::json;

pub async fn run(args: DocumentsArgs, config: Config, format: OutputFormat) -> Result<()> {
    match args.action {
        DocumentsAction::List {
            status,
            limit,
            offset,
        } => {
            let status = status
                .map(|s| s.parse::<DocumentStatus>())
                .transpose()?;
            let db = open_database(&config)?;
            let docs = db.list_documents(status, limit, offset)?;
            match format {
                OutputFormat::Json => print!("{}", json::format_value(&docs)),
                OutputFormat::Cli => print!("{}", terminal::format_documents(&docs)),
            }
        }
        DocumentsAction::Get { id, chunks } => {
            let db = open_database(&config)?;
            let doc = db.get_document(&id)?;
            let chunk_refs = if chunks {
                Some(db.document_chunks(&id)?)
            } else {
                None
            };
            match format {
                OutputFormat::Json => print!(
                    "{}",
                    json::format_value(&json!({ "document": doc, "chunks": chunk_refs }))
                ),
                OutputFormat::Cli => {
                    print!("{}", terminal::format_document(&doc, chunk_refs.as_deref()))
                }
            }
        }
        DocumentsAction::Delete { id } => {
            let service = RagService::from_config(config)?;
            let outcome = service.delete_document(&id).await?;
            match format {
                OutputFormat::Json => print!("{}", json::format_value(&outcome)),
                OutputFormat::Cli => println!(
                    "Deleted document {} ({} vectors removed)",
                    outcome.document_id, outcome.vectors_removed
                ),
            }
        }
    }
    Ok(())
}
