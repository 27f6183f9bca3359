//! Ask command

use super::print_stream;
use crate::app::{AskArgs, OutputFormat};
use crate::output::json;
use anyhow::Result;
use ragroute_core::{Config, ModelRouter};
use serde_json::json;

pub async fn run(args: AskArgs, config: &Config, format: OutputFormat) -> Result<()> {
    let prompt = args.prompt.join(" ");
    let options = args.sampling.options();
    let provider = args.sampling.provider.as_deref();
    let router = ModelRouter::new(config.llm.clone());

    if args.sampling.stream {
        options.validate()?;
        let client = match args.api_key.as_deref() {
            Some(key) => router.client_with_key(provider, key)?,
            None => router.client(provider)?,
        };
        let stream = client.stream(&prompt, &options).await?;
        let (provider, model) = (stream.provider().to_string(), stream.model().to_string());
        let content = print_stream(stream, format == OutputFormat::Cli).await?;
        if format == OutputFormat::Json {
            print!(
                "{}",
                json::format_value(&json!({
                    "content": content,
                    "provider": provider,
                    "model": model,
                }))
            );
        }
        return Ok(());
    }

    let response = match args.api_key.as_deref() {
        Some(key) => {
            options.validate()?;
            router
                .client_with_key(provider, key)?
                .ask(&prompt, &options)
                .await?
        }
        None => router.ask(&prompt, &options, provider).await?,
    };

    match format {
        OutputFormat::Json => print!("{}", json::format_value(&response)),
        OutputFormat::Cli => {
            println!("{}", response.content);
            if let Some(tokens) = response.total_tokens() {
                eprintln!("[{} {} | {} tokens]", response.provider, response.model, tokens);
            }
        }
    }
    Ok(())
}
