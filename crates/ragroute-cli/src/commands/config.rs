//! Configuration commands

use crate::app::{ConfigAction, ConfigArgs, OutputFormat};
use crate::output::json;
use anyhow::Result;
use ragroute_core::Config;

pub async fn run(args: ConfigArgs, config: &Config, format: OutputFormat) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let redacted = config.redacted();
            match format {
                OutputFormat::Json => print!("{}", json::format_value(&redacted)),
                OutputFormat::Cli => print!("{}", redacted.to_yaml()?),
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path();
            match format {
                OutputFormat::Json => print!(
                    "{}",
                    json::format_value(&serde_json::json!({
                        "path": path,
                        "exists": path.exists(),
                    }))
                ),
                OutputFormat::Cli => println!("{}", path.display()),
            }
        }
    }
    Ok(())
}
