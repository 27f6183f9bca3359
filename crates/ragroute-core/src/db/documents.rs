//! Document operations

use super::schema::immediate;
use super::{parse_timestamp, Database};
use crate::error::{RagError, Result};
use crate::vectors::Metadata;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

/// Characters of chunk text kept as a preview
const PREVIEW_CHARS: usize = 200;

/// Document processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Only `processing -> completed` and `processing -> failed` are allowed
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Completed) | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(RagError::validation(format!("unknown document status: {}", other))),
        }
    }
}

/// Document record from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    pub file_type: String,
    pub source_type: String,
    pub status: DocumentStatus,
    pub chunks_count: usize,
    pub error_message: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a document starts processing
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_size: u64,
    pub file_type: String,
    pub source_type: String,
    pub metadata: Metadata,
}

/// Chunk to vector mapping row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub chunk_index: usize,
    pub vector_id: String,
    pub preview: String,
}

impl ChunkRef {
    pub fn new(chunk_index: usize, vector_id: impl Into<String>, text: &str) -> Self {
        Self {
            chunk_index,
            vector_id: vector_id.into(),
            preview: text.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, filename, file_size, file_type, source_type, status, \
                                chunks_count, error_message, metadata, created_at, updated_at";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    let status: String = row.get(5)?;
    let metadata: String = row.get(8)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(DocumentRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_size: row.get::<_, i64>(2)? as u64,
        file_type: row.get(3)?,
        source_type: row.get(4)?,
        status: status.parse().unwrap_or(DocumentStatus::Failed),
        chunks_count: row.get::<_, i64>(6)? as usize,
        error_message: row.get(7)?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl Database {
    /// Insert a document in `processing` state
    pub fn create_document(&self, doc: &NewDocument) -> Result<DocumentRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO documents (id, filename, file_size, file_type, source_type, status,
                                    chunks_count, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'processing', 0, ?6, ?7, ?7)",
            params![
                id,
                doc.filename,
                doc.file_size as i64,
                doc.file_type,
                doc.source_type,
                serde_json::to_string(&doc.metadata)?,
                now
            ],
        )?;
        self.get_document(&id)
    }

    /// Move a document out of `processing`
    pub fn update_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        chunks_count: usize,
        error_message: Option<&str>,
    ) -> Result<DocumentRecord> {
        let current = self.get_document(id)?;
        if !current.status.can_transition_to(status) {
            return Err(RagError::validation(format!(
                "invalid status transition for document {}: {} -> {}",
                id, current.status, status
            ))
            .with_details(json!({
                "document_id": id,
                "from": current.status.as_str(),
                "to": status.as_str(),
            })));
        }

        self.conn().execute(
            "UPDATE documents SET status = ?2, chunks_count = ?3, error_message = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                chunks_count as i64,
                error_message,
                Utc::now().to_rfc3339()
            ],
        )?;
        self.get_document(id)
    }

    pub fn mark_document_completed(&self, id: &str, chunks_count: usize) -> Result<DocumentRecord> {
        self.update_document_status(id, DocumentStatus::Completed, chunks_count, None)
    }

    pub fn mark_document_failed(&self, id: &str, error: &str) -> Result<DocumentRecord> {
        self.update_document_status(id, DocumentStatus::Failed, 0, Some(error))
    }

    pub fn get_document(&self, id: &str) -> Result<DocumentRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id],
                document_from_row,
            )
            .optional()?
            .ok_or_else(|| RagError::not_found(format!("document '{}'", id)))
    }

    /// Most recent document with this filename and source type
    pub fn find_document(&self, filename: &str, source_type: &str) -> Result<Option<DocumentRecord>> {
        let doc = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {} FROM documents WHERE filename = ?1 AND source_type = ?2
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    DOCUMENT_COLUMNS
                ),
                params![filename, source_type],
                document_from_row,
            )
            .optional()?;
        Ok(doc)
    }

    /// Newest first
    pub fn list_documents(
        &self,
        status: Option<DocumentStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM documents
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2 OFFSET ?3",
            DOCUMENT_COLUMNS
        ))?;
        let docs = stmt
            .query_map(
                params![status.map(|s| s.as_str()), limit as i64, offset as i64],
                document_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn count_documents(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete a document and its chunk mapping; false if it did not exist
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        immediate(&conn, |conn| {
            conn.execute("DELETE FROM document_chunks WHERE document_id = ?1", params![id])?;
            let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
            Ok(rows > 0)
        })
    }

    /// Record the vector ids of a document's chunks
    pub fn record_chunks(&self, document_id: &str, chunks: &[ChunkRef]) -> Result<()> {
        let conn = self.conn();
        immediate(&conn, |conn| {
            let mut stmt = conn.prepare(
                "INSERT OR REPLACE INTO document_chunks (document_id, chunk_index, vector_id, preview)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    document_id,
                    chunk.chunk_index as i64,
                    chunk.vector_id,
                    chunk.preview
                ])?;
            }
            Ok(())
        })
    }

    /// Chunk mapping of a document, by chunk index
    pub fn document_chunks(&self, document_id: &str) -> Result<Vec<ChunkRef>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT chunk_index, vector_id, preview FROM document_chunks
             WHERE document_id = ?1 ORDER BY chunk_index",
        )?;
        let chunks = stmt
            .query_map(params![document_id], |row| {
                Ok(ChunkRef {
                    chunk_index: row.get::<_, i64>(0)? as usize,
                    vector_id: row.get(1)?,
                    preview: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn new_doc(name: &str) -> NewDocument {
        NewDocument {
            filename: name.to_string(),
            file_size: 42,
            file_type: "text".to_string(),
            source_type: "upload".to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_status_transitions() {
        let db = db();
        let doc = db.create_document(&new_doc("a.txt")).unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);

        let done = db.mark_document_completed(&doc.id, 3).unwrap();
        assert_eq!(done.status, DocumentStatus::Completed);
        assert_eq!(done.chunks_count, 3);

        let err = db.mark_document_failed(&doc.id, "late failure").unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn test_failed_document_keeps_error() {
        let db = db();
        let doc = db.create_document(&new_doc("b.pdf")).unwrap();
        let failed = db.mark_document_failed(&doc.id, "embedding failed").unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("embedding failed"));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let err = db().get_document("nope").unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }

    #[test]
    fn test_list_filter_and_delete() {
        let db = db();
        let a = db.create_document(&new_doc("a.txt")).unwrap();
        let b = db.create_document(&new_doc("b.txt")).unwrap();
        db.mark_document_completed(&a.id, 1).unwrap();

        assert_eq!(db.list_documents(None, 10, 0).unwrap().len(), 2);
        let completed = db
            .list_documents(Some(DocumentStatus::Completed), 10, 0)
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, a.id);

        db.record_chunks(&b.id, &[ChunkRef::new(0, "b_chunk_0", "text")])
            .unwrap();
        assert_eq!(db.document_chunks(&b.id).unwrap().len(), 1);
        assert!(db.delete_document(&b.id).unwrap());
        assert!(!db.delete_document(&b.id).unwrap());
        assert!(db.document_chunks(&b.id).unwrap().is_empty());
        assert_eq!(db.count_documents().unwrap(), 1);
    }

    #[test]
    fn test_find_document_by_filename() {
        let db = db();
        let mut filing = new_doc("0000320193-23-000106.html");
        filing.source_type = "sec_filing".into();
        let created = db.create_document(&filing).unwrap();

        let found = db
            .find_document("0000320193-23-000106.html", "sec_filing")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(db
            .find_document("0000320193-23-000106.html", "upload")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_preview_is_truncated() {
        let long = "x".repeat(500);
        assert_eq!(ChunkRef::new(0, "id", &long).preview.len(), PREVIEW_CHARS);
    }
}
