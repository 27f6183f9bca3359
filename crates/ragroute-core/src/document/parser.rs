//! Document parsing: format detection, upload validation and text extraction

use crate::error::{RagError, Result};
use crate::vectors::Metadata;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::Path;

lazy_static! {
    static ref HEADING_RE: Regex = Regex::new(r"(?m)^#{1,6}\s+\S").unwrap();
}

/// Default maximum accepted upload size
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Accepted file extensions
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];

/// Bytes inspected for NUL when sniffing text payloads
const TEXT_SNIFF_BYTES: usize = 1024;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
            Self::Pdf => "application/pdf",
        }
    }

    /// Detect from a file extension (without the dot, any case)
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "txt" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            "pdf" => Ok(Self::Pdf),
            other => Err(unsupported("extension", &format!(".{}", other))),
        }
    }

    /// Detect from a filename's extension
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| unsupported("extension", filename))?;
        Self::from_extension(ext)
    }

    /// Detect from a declared MIME type
    pub fn from_mime(mime: &str) -> Result<Self> {
        let base = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match base.as_str() {
            "text/plain" => Ok(Self::Text),
            "text/markdown" | "text/x-markdown" => Ok(Self::Markdown),
            "application/pdf" => Ok(Self::Pdf),
            _ => Err(unsupported("mime_type", mime)),
        }
    }

    fn parser(&self) -> Box<dyn DocumentParser> {
        match self {
            Self::Text => Box::new(TextParser),
            Self::Markdown => Box::new(MarkdownParser),
            Self::Pdf => Box::new(PdfParser),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn unsupported(field: &str, value: &str) -> RagError {
    RagError::validation(format!(
        "Unsupported file type: {}. Allowed types: {}",
        value,
        ALLOWED_EXTENSIONS
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    ))
    .with_details(json!({ field: value, "allowed_extensions": ALLOWED_EXTENSIONS }))
}

/// Extracted text plus format-level metadata
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub format: DocumentFormat,
    pub text: String,
    pub metadata: Metadata,
}

/// Text extraction for one format
pub trait DocumentParser: Send + Sync {
    fn format(&self) -> DocumentFormat;

    fn extract_text(&self, bytes: &[u8]) -> Result<String>;

    /// Structure hints beyond the common counts
    fn structure_hints(&self, _text: &str, _metadata: &mut Metadata) {}
}

struct TextParser;

impl DocumentParser for TextParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Text
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

struct MarkdownParser;

impl DocumentParser for MarkdownParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Markdown
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn structure_hints(&self, text: &str, metadata: &mut Metadata) {
        metadata.insert(
            "heading_count".into(),
            json!(HEADING_RE.find_iter(text).count()),
        );
    }
}

struct PdfParser;

impl DocumentParser for PdfParser {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            RagError::validation(format!("Failed to extract text from PDF: {}", e))
                .with_details(json!({ "format": "pdf" }))
        })
    }

    fn structure_hints(&self, text: &str, metadata: &mut Metadata) {
        // pdf-extract separates pages with form feeds
        let pages = text.matches('\u{c}').count() + 1;
        metadata.insert("page_count".into(), json!(pages));
    }
}

/// Check an upload before any side effect; returns the detected format
pub fn validate_upload(filename: &str, bytes: &[u8], max_bytes: usize) -> Result<DocumentFormat> {
    let format = DocumentFormat::from_filename(filename)?;

    if bytes.is_empty() {
        return Err(RagError::validation("File is empty")
            .with_details(json!({ "filename": filename })));
    }
    if bytes.len() > max_bytes {
        return Err(RagError::validation(format!(
            "File too large: {} bytes (maximum {} bytes)",
            bytes.len(),
            max_bytes
        ))
        .with_details(json!({ "filename": filename, "size": bytes.len(), "max_size": max_bytes })));
    }

    match format {
        DocumentFormat::Pdf if !bytes.starts_with(b"%PDF-") => {
            Err(RagError::validation("File content does not match PDF format")
                .with_details(json!({ "filename": filename, "format": "pdf" })))
        }
        DocumentFormat::Text | DocumentFormat::Markdown
            if bytes[..bytes.len().min(TEXT_SNIFF_BYTES)].contains(&0) =>
        {
            Err(RagError::validation("File appears to be binary, not text")
                .with_details(json!({ "filename": filename, "format": format.as_str() })))
        }
        _ => Ok(format),
    }
}

/// Extract text and basic metadata from raw bytes of a known format
pub fn parse_document(bytes: &[u8], format: DocumentFormat) -> Result<ParsedDocument> {
    let parser = format.parser();
    let text = parser.extract_text(bytes)?;

    let mut metadata = Metadata::new();
    metadata.insert("format".into(), json!(parser.format().as_str()));
    metadata.insert("mime_type".into(), json!(format.mime_type()));
    metadata.insert("char_count".into(), json!(text.chars().count()));
    metadata.insert("word_count".into(), json!(text.split_whitespace().count()));
    metadata.insert("line_count".into(), json!(text.lines().count()));
    parser.structure_hints(&text, &mut metadata);

    Ok(ParsedDocument {
        format,
        text,
        metadata,
    })
}
