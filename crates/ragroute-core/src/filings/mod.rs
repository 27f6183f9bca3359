//! SEC EDGAR filings as a document source
//!
//! Filings are searched and downloaded through [`EdgarClient`], reduced to
//! text with [`html_to_text`] and split into "Item" sections before they
//! reach the document pipeline.

mod edgar;
mod parser;

pub use edgar::{
    pad_cik, sanitize_accession, EdgarClient, EdgarEndpoints, FilingQuery, FilingSearchResult,
    PROVIDER,
};
pub use parser::{extract_sections, html_to_text, FilingSection, FULL_DOCUMENT};

use serde::{Deserialize, Serialize};

/// Source type recorded on filing documents and their chunks
pub const SOURCE_TYPE: &str = "sec_filing";

/// Frequently requested form types
pub const COMMON_FORM_TYPES: &[&str] = &["10-K", "10-Q", "8-K", "S-1", "DEF 14A", "SC 13D", "SC 13G"];

/// Identifies one filing to ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRef {
    pub cik: String,
    pub accession_number: String,
    pub form_type: String,
    pub filed_date: Option<String>,
    pub company_name: Option<String>,
}

impl From<FilingSearchResult> for FilingRef {
    fn from(hit: FilingSearchResult) -> Self {
        Self {
            cik: hit.cik,
            accession_number: hit.accession_number,
            form_type: hit.form_type,
            filed_date: hit.filed_date,
            company_name: hit.company_name,
        }
    }
}
