//! Query history

use super::{parse_timestamp, Database};
use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Logged RAG query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub question: String,
    pub answer: Option<String>,
    pub sources_count: usize,
    pub latency_ms: u64,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub tokens_used: Option<u64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Query outcome to append to the history
#[derive(Debug, Clone, Default)]
pub struct NewQuery {
    pub question: String,
    pub answer: Option<String>,
    pub sources_count: usize,
    pub latency_ms: u64,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub tokens_used: Option<u64>,
    pub error_message: Option<String>,
}

impl NewQuery {
    pub fn failed(question: impl Into<String>, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            question: question.into(),
            latency_ms,
            error_message: Some(error.into()),
            ..Self::default()
        }
    }
}

const QUERY_COLUMNS: &str = "id, question, answer, sources_count, latency_ms, model, provider, \
                             tokens_used, error_message, created_at";

fn query_from_row(row: &Row<'_>) -> rusqlite::Result<QueryRecord> {
    let created_at: String = row.get(9)?;
    Ok(QueryRecord {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        sources_count: row.get::<_, i64>(3)? as usize,
        latency_ms: row.get::<_, i64>(4)? as u64,
        model: row.get(5)?,
        provider: row.get(6)?,
        tokens_used: row.get::<_, Option<i64>>(7)?.map(|t| t as u64),
        error_message: row.get(8)?,
        created_at: parse_timestamp(&created_at),
    })
}

impl Database {
    /// Append a query to the history, returning its id
    pub fn record_query(&self, query: &NewQuery) -> Result<String> {
        if query.question.trim().is_empty() {
            return Err(RagError::validation("question must not be empty"));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO queries (id, question, answer, sources_count, latency_ms, model,
                                  provider, tokens_used, error_message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id,
                query.question,
                query.answer,
                query.sources_count as i64,
                query.latency_ms as i64,
                query.model,
                query.provider,
                query.tokens_used.map(|t| t as i64),
                query.error_message,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(id)
    }

    pub fn get_query(&self, id: &str) -> Result<QueryRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM queries WHERE id = ?1", QUERY_COLUMNS),
                params![id],
                query_from_row,
            )
            .optional()?
            .ok_or_else(|| RagError::not_found(format!("query '{}'", id)))
    }

    /// Newest first
    pub fn list_queries(&self, limit: usize, offset: usize) -> Result<Vec<QueryRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM queries ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            QUERY_COLUMNS
        ))?;
        let queries = stmt
            .query_map(params![limit as i64, offset as i64], query_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(queries)
    }

    pub fn count_queries(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM queries", [], |row| row.get(0))?;
        Ok(count as usize)
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

    #[test]
    fn test_record_and_list() {
        let db = db();
        let first = db
            .record_query(&NewQuery {
                question: "What is RAG?".into(),
                answer: Some("Retrieval augmented generation".into()),
                sources_count: 2,
                latency_ms: 120,
                model: Some("gpt-4o-mini".into()),
                provider: Some("openai".into()),
                tokens_used: Some(57),
                error_message: None,
            })
            .unwrap();
        let second = db
            .record_query(&NewQuery::failed("Second?", "[openai] HTTP 429", 15))
            .unwrap();

        let listed = db.list_queries(10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second);
        assert_eq!(listed[1].id, first);
        assert_eq!(listed[1].tokens_used, Some(57));
        assert!(listed[0].answer.is_none());
        assert_eq!(listed[0].error_message.as_deref(), Some("[openai] HTTP 429"));
        assert_eq!(db.count_queries().unwrap(), 2);
    }

    #[test]
    fn test_empty_question_rejected() {
        let err = db().record_query(&NewQuery::default()).unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn test_get_missing_query() {
        assert!(matches!(
            db().get_query("missing").unwrap_err(),
            RagError::NotFound(_)
        ));
    }
}
