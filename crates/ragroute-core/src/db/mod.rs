//! Metadata database
//!
//! SQLite storage for document records, their chunk to vector mapping and
//! the query history. Vectors themselves live in a [`crate::vectors`] store.

mod documents;
mod queries;
mod schema;

pub use documents::{ChunkRef, DocumentRecord, DocumentStatus, NewDocument};
pub use queries::{NewQuery, QueryRecord};
pub use schema::Database;
pub(crate) use schema::immediate;

use chrono::{DateTime, Utc};
use std::path::PathBuf;

impl Database {
    /// Get the default database path
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::DATA_DIR_NAME)
            .join("metadata.sqlite")
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
