//! Query history command

use super::open_database;
use crate::app::{HistoryArgs, OutputFormat};
use crate::output::{json, terminal};
use anyhow::Result;
use ragroute_core::Config;

pub async fn run(args: HistoryArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let db = open_database(config)?;
    let records = db.list_queries(args.limit, args.offset)?;
    match format {
        OutputFormat::Json => print!("{}", json::format_value(&records)),
        OutputFormat::Cli => print!("{}", terminal::format_history(&records)),
    }
    Ok(())
}
