//! Upload-to-chunks pipeline

use super::chunker::{Chunker, DocumentChunk};
use super::parser::{parse_document, validate_upload, DocumentFormat, DEFAULT_MAX_UPLOAD_BYTES};
use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::vectors::Metadata;
use serde_json::json;

/// Output of processing one document
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub format: DocumentFormat,
    pub text: String,
    pub metadata: Metadata,
    pub chunks: Vec<DocumentChunk>,
}

/// Validates, parses and chunks raw document bytes
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunker: Chunker,
    max_upload_bytes: usize,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new(Chunker::default())
    }
}

impl DocumentProcessor {
    pub fn new(chunker: Chunker) -> Self {
        Self {
            chunker,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        let strategy = config.strategy.parse()?;
        Ok(Self::new(Chunker::new(
            config.chunk_size,
            config.chunk_overlap,
            strategy,
        )?))
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Validate an upload by filename, then parse and chunk it
    pub fn process_upload(
        &self,
        filename: &str,
        bytes: &[u8],
        extra: &Metadata,
    ) -> Result<ProcessedDocument> {
        let format = validate_upload(filename, bytes, self.max_upload_bytes)?;

        let mut metadata = extra.clone();
        metadata.insert("filename".into(), json!(filename));
        if let Some(ext) = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
        {
            metadata.insert("extension".into(), json!(ext.to_lowercase()));
        }
        metadata.insert("file_size".into(), json!(bytes.len()));

        self.process(bytes, format, metadata)
    }

    /// Parse and chunk bytes of a known format, with caller metadata
    /// copied into the document and every chunk
    pub fn process(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
        metadata: Metadata,
    ) -> Result<ProcessedDocument> {
        let parsed = parse_document(bytes, format)?;
        if parsed.text.trim().is_empty() {
            return Err(RagError::validation("Document contains no extractable text")
                .with_details(json!({ "format": format.as_str() })));
        }

        self.process_text(parsed.text, format, {
            let mut merged = parsed.metadata;
            merged.extend(metadata);
            merged
        })
    }

    /// Chunk already-extracted text
    pub fn process_text(
        &self,
        text: String,
        format: DocumentFormat,
        metadata: Metadata,
    ) -> Result<ProcessedDocument> {
        if text.trim().is_empty() {
            return Err(RagError::validation("Document contains no extractable text"));
        }

        let mut chunk_meta = metadata.clone();
        chunk_meta.insert("chunk_strategy".into(), json!(self.chunker.strategy().as_str()));
        let chunks = self.chunker.chunk_with_metadata(&text, &chunk_meta);

        tracing::debug!(
            format = %format,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "document processed"
        );

        Ok(ProcessedDocument {
            format,
            text,
            metadata,
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{reassemble, ChunkStrategy};

    #[test]
    fn test_process_upload_attaches_metadata() {
        let processor = DocumentProcessor::default();
        let mut extra = Metadata::new();
        extra.insert("document_id".into(), json!("doc-1"));

        let doc = processor
            .process_upload("notes.txt", b"One. Two. Three.", &extra)
            .unwrap();
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.metadata["filename"], "notes.txt");
        assert_eq!(doc.metadata["extension"], "txt");
        assert_eq!(doc.chunks[0].metadata["document_id"], "doc-1");
        assert_eq!(doc.chunks[0].metadata["chunk_strategy"], "sentence");
    }

    #[test]
    fn test_whitespace_only_document_rejected() {
        let processor = DocumentProcessor::default();
        let err = processor
            .process_upload("empty.md", b"   \n\n  ", &Metadata::new())
            .unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn test_from_config_validates() {
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            strategy: "fixed".into(),
        };
        assert!(DocumentProcessor::from_config(&config).is_err());

        let config = ChunkingConfig {
            chunk_size: 20,
            chunk_overlap: 5,
            strategy: "token".into(),
        };
        let processor = DocumentProcessor::from_config(&config).unwrap();
        assert_eq!(processor.chunker().strategy(), ChunkStrategy::Token);
        let text = "word ".repeat(50);
        let doc = processor
            .process_text(text.clone(), DocumentFormat::Text, Metadata::new())
            .unwrap();
        assert_eq!(reassemble(&doc.chunks), text);
    }
}
