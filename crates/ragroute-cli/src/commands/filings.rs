//! EDGAR filing commands

use crate::app::{FilingsAction, FilingsArgs, OutputFormat};
use crate::output::{json, terminal};
use anyhow::Result;
use ragroute_core::{Config, EdgarClient, FilingQuery, FilingRef, RagService};

pub async fn run(args: FilingsArgs, config: Config, format: OutputFormat) -> Result<()> {
    match args.action {
        FilingsAction::Search {
            query,
            forms,
            from,
            to,
            limit,
        } => {
            let client = EdgarClient::new(&config.filings)?;
            let mut search = FilingQuery::new(query.join(" "));
            search.count = limit;
            search.forms = forms;
            search.date_from = from;
            search.date_to = to;

            let hits = client.search_filings(&search).await?;
            match format {
                OutputFormat::Json => print!("{}", json::format_value(&hits)),
                OutputFormat::Cli => print!("{}", terminal::format_filings(&hits)),
            }
        }
        FilingsAction::Ingest {
            cik,
            accession,
            form,
            filed_date,
            company,
        } => {
            let service = RagService::from_config(config)?;
            let outcome = service
                .ingest_filing(&FilingRef {
                    cik,
                    accession_number: accession,
                    form_type: form,
                    filed_date,
                    company_name: company,
                })
                .await?;
            match format {
                OutputFormat::Json => print!("{}", json::format_value(&outcome)),
                OutputFormat::Cli if outcome.already_ingested => println!(
                    "Filing already ingested #{}",
                    outcome.document.id
                ),
                OutputFormat::Cli => println!(
                    "Ingested {} ({} sections, {} chunks) #{}",
                    outcome.document.filename,
                    outcome.sections.len(),
                    outcome.document.chunks_count,
                    outcome.document.id
                ),
            }
        }
    }
    Ok(())
}
