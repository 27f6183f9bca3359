//! Application service
//!
//! [`RagService`] owns one instance of every component and exposes the
//! operations the CLI drives: direct prompts, document upload and deletion,
//! RAG queries with history, and filing ingestion.

use crate::config::Config;
use crate::db::{ChunkRef, Database, DocumentRecord, DocumentStatus, NewDocument, NewQuery, QueryRecord};
use crate::document::{DocumentChunk, DocumentFormat, DocumentProcessor};
use crate::embeddings::{build_embedder, Embedder};
use crate::error::{RagError, Result, GENERIC_PROVIDER_STATUS};
use crate::filings::{
    extract_sections, html_to_text, pad_cik, sanitize_accession, EdgarClient, FilingQuery,
    FilingRef, FilingSearchResult, FilingSection, SOURCE_TYPE as FILING_SOURCE,
};
use crate::llm::{AskOptions, CompletionStream, ModelResponse, ModelRouter};
use crate::rag::{RagAnswer, RagOptions, RagPipeline, RagRequest, RagStream};
use crate::vectors::{build_vector_store, Metadata, NewRecord, VectorStore};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

/// Source type of documents added through [`RagService::upload_document`]
pub const UPLOAD_SOURCE: &str = "upload";

/// Vector record id of a document chunk
pub fn chunk_vector_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", document_id, chunk_index)
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document: DocumentRecord,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub document_id: String,
    pub vectors_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    /// History id; `None` when the history write failed
    pub query_id: Option<String>,
    #[serde(flatten)]
    pub answer: RagAnswer,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document: DocumentRecord,
    /// Titles of the indexed sections
    pub sections: Vec<String>,
    /// The filing was already ingested and nothing was downloaded
    pub already_ingested: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub documents: usize,
    pub vectors: usize,
    pub queries: usize,
    pub vector_backend: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: usize,
}

pub struct RagService {
    config: Config,
    router: Arc<ModelRouter>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    db: Arc<Database>,
    processor: DocumentProcessor,
    pipeline: RagPipeline,
    edgar: OnceCell<EdgarClient>,
}

impl RagService {
    /// Assemble a service from already-built components.
    ///
    /// The embedder and the vector store must agree on dimensionality.
    pub fn new(
        config: Config,
        router: Arc<ModelRouter>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        db: Arc<Database>,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(RagError::config(format!(
                "Embedding dimensions ({}) do not match the vector store ({})",
                embedder.dimensions(),
                store.dimensions()
            ))
            .with_details(json!({
                "embedding_model": embedder.model_name(),
                "embedding_dimensions": embedder.dimensions(),
                "store_dimensions": store.dimensions(),
            })));
        }

        let processor = DocumentProcessor::from_config(&config.chunking)?;
        let pipeline = RagPipeline::new(
            embedder.clone(),
            store.clone(),
            router.clone(),
            RagOptions::from(&config.retrieval),
        );

        Ok(Self {
            config,
            router,
            embedder,
            store,
            db,
            processor,
            pipeline,
            edgar: OnceCell::new(),
        })
    }

    /// Build every component from configuration
    pub fn from_config(config: Config) -> Result<Self> {
        let router = Arc::new(ModelRouter::new(config.llm.clone()));
        let embedder = build_embedder(&config.embedding)?;
        let store = build_vector_store(&config.vector_store, embedder.dimensions())?;
        let db = Database::open(&config.database_path)?;
        db.initialize()?;
        Self::new(config, router, embedder, store, Arc::new(db))
    }

    /// Use a prepared filings client instead of one built from configuration
    pub fn with_edgar(mut self, client: EdgarClient) -> Self {
        self.edgar = OnceCell::from(client);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Send a prompt straight to the routed model
    pub async fn ask(
        &self,
        prompt: &str,
        options: &AskOptions,
        provider: Option<&str>,
    ) -> Result<ModelResponse> {
        self.router.ask(prompt, options, provider).await
    }

    /// Like [`ask`](Self::ask) with a per-request credential
    pub async fn ask_with_key(
        &self,
        prompt: &str,
        options: &AskOptions,
        provider: Option<&str>,
        api_key: &str,
    ) -> Result<ModelResponse> {
        options.validate()?;
        let client = self.router.client_with_key(provider, api_key)?;
        client.ask(prompt, options).await
    }

    pub async fn ask_stream(
        &self,
        prompt: &str,
        options: &AskOptions,
        provider: Option<&str>,
    ) -> Result<CompletionStream> {
        self.router.stream(prompt, options, provider).await
    }

    /// Validate, parse, chunk, embed and store an uploaded file.
    ///
    /// Nothing is recorded when validation or parsing fails. Once the
    /// document row exists, a later failure marks it `failed`.
    pub async fn upload_document(
        &self,
        filename: &str,
        bytes: &[u8],
        extra: &Metadata,
    ) -> Result<UploadOutcome> {
        let processed = self.processor.process_upload(filename, bytes, extra)?;

        let mut metadata = processed.metadata;
        metadata.insert("source_type".into(), json!(UPLOAD_SOURCE));
        let document = self.db.create_document(&NewDocument {
            filename: filename.to_string(),
            file_size: bytes.len() as u64,
            file_type: processed.format.as_str().to_string(),
            source_type: UPLOAD_SOURCE.to_string(),
            metadata,
        })?;

        let chunks = processed
            .chunks
            .into_iter()
            .map(|mut chunk| {
                chunk.metadata.insert("source_type".into(), json!(UPLOAD_SOURCE));
                chunk
            })
            .collect();

        match self.index_chunks(&document.id, chunks).await {
            Ok(count) => {
                let document = self.db.mark_document_completed(&document.id, count)?;
                tracing::info!(
                    document_id = %document.id,
                    filename,
                    chunks = count,
                    "document processed"
                );
                Ok(UploadOutcome {
                    document,
                    chunks: count,
                })
            }
            Err(err) => {
                self.fail_document(&document.id, &err);
                Err(err)
            }
        }
    }

    /// Embed chunks, store them and record the chunk to vector mapping
    async fn index_chunks(&self, document_id: &str, chunks: Vec<DocumentChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::provider(
                self.embedder.provider(),
                GENERIC_PROVIDER_STATUS,
                format!(
                    "expected {} embeddings, received {}",
                    chunks.len(),
                    embeddings.len()
                ),
            ));
        }

        let mut refs = Vec::with_capacity(chunks.len());
        let mut records = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let id = chunk_vector_id(document_id, chunk.index);
            refs.push(ChunkRef::new(chunk.index, id.clone(), &chunk.text));

            let mut metadata = chunk.metadata;
            metadata.insert("document_id".into(), json!(document_id));
            metadata.insert("chunk_index".into(), json!(chunk.index));
            records.push(NewRecord::new(embedding, chunk.text, metadata).with_id(id));
        }

        let ids = self.store.add(records).await?;
        if let Err(err) = self.db.record_chunks(document_id, &refs) {
            if let Err(cleanup) = self.store.delete(&ids).await {
                tracing::warn!(document_id, error = %cleanup, "failed to remove orphaned vectors");
            }
            return Err(err);
        }
        tracing::debug!(document_id, vectors = ids.len(), "stored chunk vectors");
        Ok(ids.len())
    }

    fn fail_document(&self, document_id: &str, err: &RagError) {
        tracing::error!(document_id, error = %err, "document processing failed");
        if let Err(mark) = self.db.mark_document_failed(document_id, &err.to_string()) {
            tracing::warn!(document_id, error = %mark, "failed to mark document as failed");
        }
    }

    /// Remove a document, its chunk mapping and its vectors
    pub async fn delete_document(&self, document_id: &str) -> Result<DeleteOutcome> {
        self.db.get_document(document_id)?;
        let ids: Vec<String> = self
            .db
            .document_chunks(document_id)?
            .into_iter()
            .map(|c| c.vector_id)
            .collect();

        let vectors_removed = self.store.delete(&ids).await?;
        self.db.delete_document(document_id)?;
        tracing::info!(document_id, vectors_removed, "document deleted");
        Ok(DeleteOutcome {
            document_id: document_id.to_string(),
            vectors_removed,
        })
    }

    /// Answer a question from stored documents and append it to the history.
    ///
    /// Failed queries are recorded with their error before it is returned.
    pub async fn query(&self, request: &RagRequest) -> Result<QueryOutcome> {
        let started = Instant::now();
        match self.pipeline.query(request).await {
            Ok(answer) => {
                let query_id = self.record_query(&NewQuery {
                    question: request.question.clone(),
                    answer: Some(answer.answer.clone()),
                    sources_count: answer.sources.len(),
                    latency_ms: answer.latency_ms,
                    model: Some(answer.model.clone()),
                    provider: Some(answer.provider.clone()),
                    tokens_used: answer.tokens_used(),
                    error_message: None,
                });
                tracing::info!(
                    query_id = ?query_id,
                    sources = answer.sources.len(),
                    latency_ms = answer.latency_ms,
                    "query answered"
                );
                Ok(QueryOutcome { query_id, answer })
            }
            Err(err) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                self.record_query(&NewQuery::failed(
                    request.question.clone(),
                    err.to_string(),
                    latency_ms,
                ));
                Err(err)
            }
        }
    }

    fn record_query(&self, query: &NewQuery) -> Option<String> {
        match self.db.record_query(query) {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "failed to record query history");
                None
            }
        }
    }

    /// Streamed answer; streamed queries are not written to the history
    pub async fn query_stream(&self, request: &RagRequest) -> Result<RagStream> {
        self.pipeline.query_stream(request).await
    }

    async fn edgar(&self) -> Result<&EdgarClient> {
        self.edgar
            .get_or_try_init(|| async { EdgarClient::new(&self.config.filings) })
            .await
    }

    pub async fn search_filings(&self, query: &FilingQuery) -> Result<Vec<FilingSearchResult>> {
        self.edgar().await?.search_filings(query).await
    }

    /// Download a filing and index it section by section.
    ///
    /// A filing that already completed ingestion is returned as is; an
    /// earlier failed or interrupted attempt is removed and retried.
    pub async fn ingest_filing(&self, filing: &FilingRef) -> Result<IngestOutcome> {
        let accession = sanitize_accession(&filing.accession_number)?.to_string();
        let cik = pad_cik(&filing.cik)?;
        let filename = format!("{}.html", accession);

        if let Some(existing) = self.db.find_document(&filename, FILING_SOURCE)? {
            if existing.status == DocumentStatus::Completed {
                tracing::info!(accession_number = %accession, document_id = %existing.id, "filing already ingested");
                return Ok(IngestOutcome {
                    document: existing,
                    sections: Vec::new(),
                    already_ingested: true,
                });
            }
            self.delete_document(&existing.id).await?;
        }

        let html = self.edgar().await?.download_primary_html(&cik, &accession).await?;
        let text = html_to_text(&html);
        if text.trim().is_empty() {
            return Err(RagError::validation("Filing contains no extractable text")
                .with_details(json!({ "accession_number": accession })));
        }
        let sections = extract_sections(&text);

        let mut metadata = Metadata::new();
        metadata.insert("source_type".into(), json!(FILING_SOURCE));
        metadata.insert("filename".into(), json!(filename));
        metadata.insert("form_type".into(), json!(filing.form_type));
        metadata.insert("cik".into(), json!(cik));
        metadata.insert("accession_number".into(), json!(accession));
        if let Some(date) = &filing.filed_date {
            metadata.insert("filed_date".into(), json!(date));
        }
        if let Some(company) = &filing.company_name {
            metadata.insert("company_name".into(), json!(company));
        }

        let document = self.db.create_document(&NewDocument {
            filename,
            file_size: html.len() as u64,
            file_type: FILING_SOURCE.to_string(),
            source_type: FILING_SOURCE.to_string(),
            metadata: metadata.clone(),
        })?;

        match self.index_sections(&document.id, &sections, &metadata).await {
            Ok(count) => {
                let document = self.db.mark_document_completed(&document.id, count)?;
                tracing::info!(
                    document_id = %document.id,
                    accession_number = %accession,
                    sections = sections.len(),
                    chunks = count,
                    "filing ingested"
                );
                Ok(IngestOutcome {
                    document,
                    sections: sections.into_iter().map(|s| s.title).collect(),
                    already_ingested: false,
                })
            }
            Err(err) => {
                self.fail_document(&document.id, &err);
                Err(err)
            }
        }
    }

    /// Chunk every section and index them as one document with running chunk indices
    async fn index_sections(
        &self,
        document_id: &str,
        sections: &[FilingSection],
        metadata: &Metadata,
    ) -> Result<usize> {
        let mut chunks = Vec::new();
        for section in sections {
            let mut section_meta = metadata.clone();
            section_meta.insert("section_title".into(), json!(section.title));
            let processed =
                self.processor
                    .process_text(section.text.clone(), DocumentFormat::Text, section_meta)?;
            for mut chunk in processed.chunks {
                chunk.index = chunks.len();
                chunks.push(chunk);
            }
        }
        self.index_chunks(document_id, chunks).await
    }

    pub fn documents(
        &self,
        status: Option<DocumentStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>> {
        self.db.list_documents(status, limit, offset)
    }

    pub fn get_document(&self, document_id: &str) -> Result<DocumentRecord> {
        self.db.get_document(document_id)
    }

    pub fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkRef>> {
        self.db.get_document(document_id)?;
        self.db.document_chunks(document_id)
    }

    pub fn history(&self, limit: usize, offset: usize) -> Result<Vec<QueryRecord>> {
        self.db.list_queries(limit, offset)
    }

    pub fn get_query(&self, query_id: &str) -> Result<QueryRecord> {
        self.db.get_query(query_id)
    }

    pub async fn stats(&self) -> Result<ServiceStats> {
        Ok(ServiceStats {
            documents: self.db.count_documents()?,
            vectors: self.store.count().await?,
            queries: self.db.count_queries()?,
            vector_backend: self.store.backend().to_string(),
            embedding_provider: self.embedder.provider().to_string(),
            embedding_model: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimensions(),
        })
    }
}
