//! Document processing: parse raw bytes, then split text into chunks

mod chunker;
mod parser;
mod processor;

pub use chunker::{
    reassemble, ChunkStrategy, Chunker, DocumentChunk, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use parser::{
    parse_document, validate_upload, DocumentFormat, DocumentParser, ParsedDocument,
    ALLOWED_EXTENSIONS, DEFAULT_MAX_UPLOAD_BYTES,
};
pub use processor::{DocumentProcessor, ProcessedDocument};
