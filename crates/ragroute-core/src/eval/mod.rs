//! Answer evaluation
//!
//! Pluggable [`Metric`]s scored per case and aggregated into an
//! [`EvaluationReport`] that can be saved, reloaded and compared.

mod evaluator;
mod metrics;

pub use evaluator::{
    compare_reports, load_test_set, CaseResult, EvaluationReport, Evaluator, MetricDelta,
    ReportComparison, TestCase,
};
pub use metrics::{
    answer_tokens, normalize_answer, token_f1, AnswerRelevance, ExactMatch, Metric,
    SemanticSimilarity, TokenF1, ANSWER_RELEVANCE, EXACT_MATCH, SEMANTIC_SIMILARITY, TOKEN_F1,
};

use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::llm::ModelClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

pub const METRIC_NAMES: [&str; 4] = [EXACT_MATCH, TOKEN_F1, SEMANTIC_SIMILARITY, ANSWER_RELEVANCE];

/// Outcome of one metric on one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub metric: String,
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
    pub explanation: String,
    #[serde(default)]
    pub details: Value,
}

impl EvaluationResult {
    pub fn new(
        metric: impl Into<String>,
        score: f64,
        threshold: f64,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            score,
            threshold,
            passed: score >= threshold,
            explanation: explanation.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Metrics by name; the partial metrics receive the injected dependencies
pub fn build_metrics(
    names: &[String],
    embedder: Option<Arc<dyn Embedder>>,
    judge: Option<Arc<dyn ModelClient>>,
) -> Result<Vec<Arc<dyn Metric>>> {
    names
        .iter()
        .map(|name| -> Result<Arc<dyn Metric>> {
            match name.trim() {
                EXACT_MATCH => Ok(Arc::new(ExactMatch::default())),
                TOKEN_F1 => Ok(Arc::new(TokenF1::default())),
                SEMANTIC_SIMILARITY => Ok(Arc::new(SemanticSimilarity::new(embedder.clone()))),
                ANSWER_RELEVANCE => Ok(Arc::new(AnswerRelevance::new(judge.clone()))),
                other => Err(RagError::validation(format!(
                    "unknown metric '{}'; available: {}",
                    other,
                    METRIC_NAMES.join(", ")
                ))
                .with_details(json!({ "metric": other, "available": METRIC_NAMES }))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_flag_uses_threshold() {
        assert!(EvaluationResult::new("m", 0.5, 0.5, "").passed);
        assert!(!EvaluationResult::new("m", 0.49, 0.5, "").passed);
    }

    #[test]
    fn test_build_metrics() {
        let metrics = build_metrics(&["exact_match".into(), "token_f1".into()], None, None).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].name(), TOKEN_F1);

        let err = build_metrics(&["bleu".into()], None, None).err().unwrap();
        assert!(matches!(err, RagError::Validation { .. }));
    }
}
