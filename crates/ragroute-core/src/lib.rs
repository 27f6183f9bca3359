//! Ragroute Core Library
//!
//! Provider routing and retrieval-augmented generation over uploaded
//! documents and SEC filings.
//!
//! # Features
//! - One `ModelClient` interface over OpenAI and Anthropic, with a cached router
//! - Pluggable embedders (OpenAI, local feature hashing)
//! - Sentence, fixed-size and token chunking
//! - Vector stores behind one trait: JSON-persisted local index or SQLite
//! - RAG pipeline with source attribution, filters, streaming and timeouts
//! - Evaluation metrics and comparable reports
//! - SQLite metadata store for documents and query history

pub mod config;
pub mod db;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod filings;
mod http;
pub mod llm;
pub mod rag;
pub mod service;
pub mod vectors;

pub use config::Config;
pub use db::{Database, DocumentRecord, DocumentStatus, QueryRecord};
pub use document::{Chunker, ChunkStrategy, DocumentChunk, DocumentFormat, DocumentProcessor};
pub use embeddings::{build_embedder, Embedder};
pub use error::{Error, ErrorReport, RagError, Result};
pub use eval::{EvaluationReport, EvaluationResult, Evaluator, Metric, TestCase};
pub use filings::{EdgarClient, FilingQuery, FilingRef, FilingSearchResult};
pub use llm::{AskOptions, ModelClient, ModelResponse, ModelRouter};
pub use rag::{RagAnswer, RagPipeline, RagRequest, SourceRef};
pub use service::RagService;
pub use vectors::{build_vector_store, MetadataFilter, RetrievalResult, VectorStore};

/// Default data directory name
pub const DATA_DIR_NAME: &str = "ragroute";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "ragroute";
