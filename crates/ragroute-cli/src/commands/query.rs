//! Query command

use super::print_stream;
use crate::app::{OutputFormat, QueryArgs};
use crate::output::{json, terminal};
use anyhow::Result;
use ragroute_core::{Config, MetadataFilter, RagError, RagRequest, RagService};
use serde_json::json;
use std::time::Duration;

fn request(args: &QueryArgs) -> Result<RagRequest> {
    let sampling = &args.sampling;
    let mut request = RagRequest::new(args.question.join(" ")).with_temperature(sampling.temperature);
    if let Some(ref system) = sampling.system {
        request = request.with_system_prompt(system.clone());
    }
    if let Some(max_tokens) = sampling.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(ref provider) = sampling.provider {
        request = request.with_provider(provider.clone());
    }
    if let Some(top_k) = args.top_k {
        request = request.with_top_k(top_k);
    }
    if let Some(secs) = args.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(RagError::validation("timeout must be a positive number of seconds").into());
        }
        request = request.with_timeout(Duration::from_secs_f64(secs));
    }
    if !args.filter.is_empty() {
        let filter = args
            .filter
            .iter()
            .fold(MetadataFilter::new(), |f, (k, v)| f.with(k.clone(), v.clone()));
        request = request.with_filter(filter);
    }
    Ok(request)
}

pub async fn run(args: QueryArgs, config: Config, format: OutputFormat) -> Result<()> {
    let request = request(&args)?;
    let service = RagService::from_config(config)?;

    if args.sampling.stream {
        let streamed = service.query_stream(&request).await?;
        let answer = print_stream(streamed.stream, format == OutputFormat::Cli).await?;
        match format {
            OutputFormat::Json => print!(
                "{}",
                json::format_value(&json!({
                    "answer": answer,
                    "sources": streamed.sources,
                }))
            ),
            OutputFormat::Cli => {
                println!();
                print!("{}", terminal::format_sources(&streamed.sources, args.full));
            }
        }
        return Ok(());
    }

    let outcome = service.query(&request).await?;
    match format {
        OutputFormat::Json => print!("{}", json::format_value(&outcome)),
        OutputFormat::Cli => {
            println!("{}", outcome.answer.answer);
            println!();
            print!("{}", terminal::format_sources(&outcome.answer.sources, args.full));
        }
    }
    Ok(())
}
