//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ragroute")]
#[command(
    author,
    version,
    about = "Route prompts to LLM providers and answer questions from your documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send a prompt straight to a model
    Ask(AskArgs),

    /// Upload documents into the knowledge base
    Upload(UploadArgs),

    /// Answer a question from stored documents
    Query(QueryArgs),

    /// Manage uploaded documents
    Documents(DocumentsArgs),

    /// Show query history
    History(HistoryArgs),

    /// Evaluate answers
    Eval(EvalArgs),

    /// Search and ingest SEC EDGAR filings
    Filings(FilingsArgs),

    /// Show knowledge base status
    Status,

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct SamplingArgs {
    /// Provider to route to (defaults to LLM_PROVIDER)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Sampling temperature, 0 to 2
    #[arg(short, long, default_value = "0.7")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,
}

#[derive(Args)]
pub struct AskArgs {
    /// Prompt text
    #[arg(required = true)]
    pub prompt: Vec<String>,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Credential for this request only
    #[arg(long, env = "RAGROUTE_REQUEST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Args)]
pub struct UploadArgs {
    /// Files to upload (.pdf, .txt, .md, .markdown)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Extra metadata as key=value, repeatable
    #[arg(short, long = "meta", value_parser = parse_key_value)]
    pub metadata: Vec<(String, String)>,
}

#[derive(Args)]
pub struct QueryArgs {
    /// Question text
    #[arg(required = true)]
    pub question: Vec<String>,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Number of chunks to retrieve
    #[arg(short = 'n', long)]
    pub top_k: Option<usize>,

    /// Only retrieve chunks whose metadata matches key=value, repeatable
    #[arg(short, long, value_parser = parse_key_value)]
    pub filter: Vec<(String, String)>,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Print the retrieved chunks in full
    #[arg(long)]
    pub full: bool,
}

#[derive(Args)]
pub struct DocumentsArgs {
    #[command(subcommand)]
    pub action: DocumentsAction,
}

#[derive(Subcommand)]
pub enum DocumentsAction {
    /// List documents, newest first
    #[command(alias = "ls")]
    List {
        /// processing, completed or failed
        #[arg(long)]
        status: Option<String>,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show one document
    Get {
        id: String,
        /// Include chunk previews
        #[arg(long)]
        chunks: bool,
    },
    /// Delete a document and its vectors
    #[command(alias = "rm")]
    Delete { id: String },
}

#[derive(Args)]
pub struct HistoryArgs {
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

#[derive(Args)]
pub struct EvalArgs {
    #[command(subcommand)]
    pub action: EvalAction,
}

#[derive(Subcommand)]
pub enum EvalAction {
    /// Score a test set
    Run {
        /// JSON list of cases, or {"test_set": [...]}
        test_set: PathBuf,
        /// Comma-separated metric names
        #[arg(short, long, value_delimiter = ',', default_value = "exact_match,token_f1")]
        metrics: Vec<String>,
        /// Report name
        #[arg(long, default_value = "evaluation")]
        name: String,
        /// Write the report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fill empty actual answers by querying the knowledge base
        #[arg(long)]
        answer: bool,
    },
    /// Compare two saved reports
    Compare { baseline: PathBuf, candidate: PathBuf },
}

#[derive(Args)]
pub struct FilingsArgs {
    #[command(subcommand)]
    pub action: FilingsAction,
}

#[derive(Subcommand)]
pub enum FilingsAction {
    /// Full-text search
    Search {
        query: Vec<String>,
        /// Form types, comma-separated
        #[arg(long, value_delimiter = ',')]
        forms: Vec<String>,
        /// Earliest filing date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Latest filing date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Download a filing and add it to the knowledge base
    Ingest {
        #[arg(long)]
        cik: String,
        #[arg(long)]
        accession: String,
        #[arg(long, default_value = "10-K")]
        form: String,
        #[arg(long)]
        filed_date: Option<String>,
        #[arg(long)]
        company: Option<String>,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with credentials masked
    Show,
    /// Print the config file location
    Path,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Cli,
    Json,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}
