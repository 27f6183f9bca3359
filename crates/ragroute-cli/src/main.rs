//! Ragroute CLI
//!
//! Provider routing and retrieval-augmented answers from the command line.

use anyhow::Result;
use clap::Parser;
use ragroute_core::error::exit_codes;
use ragroute_core::{Config, RagError};
use std::process::ExitCode;

mod app;
mod commands;
mod output;

use app::{Cli, Commands, OutputFormat};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match run(cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            let code = match err.downcast_ref::<RagError>() {
                Some(rag) => {
                    output::print_error(rag, format);
                    rag.exit_code()
                }
                None => {
                    eprintln!("Error: {:#}", err);
                    exit_codes::GENERAL_ERROR
                }
            };
            ExitCode::from(code as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let format: OutputFormat = cli.format;

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args, &config, format).await,
        Commands::Upload(args) => commands::upload::run(args, config, format).await,
        Commands::Query(args) => commands::query::run(args, config, format).await,
        Commands::Documents(args) => commands::documents::run(args, config, format).await,
        Commands::History(args) => commands::history::run(args, &config, format).await,
        Commands::Eval(args) => commands::eval::run(args, config, format).await,
        Commands::Filings(args) => commands::filings::run(args, config, format).await,
        Commands::Status => commands::status::run(config, format).await,
        Commands::Config(args) => commands::config::run(args, &config, format).await,
    }
}
