//! Evaluation orchestrator and reports

use super::metrics::{ExactMatch, Metric, TokenF1};
use super::EvaluationResult;
use crate::error::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One question with its reference and produced answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub question: String,
    #[serde(default)]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub actual_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
}

impl TestCase {
    pub fn new(
        question: impl Into<String>,
        expected: Option<&str>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            expected_answer: expected.map(str::to_string),
            actual_answer: actual.into(),
            context: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub question: String,
    pub results: Vec<EvaluationResult>,
}

/// Aggregated scores for a batch of cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub total_cases: usize,
    pub cases: Vec<CaseResult>,
    /// Mean score per metric
    pub metric_means: BTreeMap<String, f64>,
    /// Mean of the metric means; `None` when nothing was scored
    pub overall_score: Option<f64>,
    /// Share of results that met their threshold
    pub pass_rate: f64,
}

impl EvaluationReport {
    /// Write the report as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), id = %self.id, "saved evaluation report");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}

/// Runs every configured metric over cases
pub struct Evaluator {
    metrics: Vec<Arc<dyn Metric>>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(vec![
            Arc::new(ExactMatch::default()),
            Arc::new(TokenF1::default()),
        ])
    }
}

impl Evaluator {
    pub fn new(metrics: Vec<Arc<dyn Metric>>) -> Self {
        tracing::debug!(metrics = metrics.len(), "initialized evaluator");
        Self { metrics }
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name().to_string()).collect()
    }

    /// Score one answer with every metric.
    ///
    /// A failing metric contributes a 0.0 result carrying the error.
    pub async fn evaluate_single(
        &self,
        question: &str,
        expected: Option<&str>,
        actual: &str,
    ) -> Vec<EvaluationResult> {
        let mut results = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            match metric.evaluate(question, expected, actual).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::error!(metric = metric.name(), error = %err, "metric failed");
                    results.push(
                        EvaluationResult::new(
                            metric.name(),
                            0.0,
                            metric.threshold(),
                            format!("metric failed: {}", err),
                        )
                        .with_details(json!({ "error": err.report() })),
                    );
                }
            }
        }
        results
    }

    pub async fn evaluate_batch(&self, name: &str, cases: &[TestCase]) -> EvaluationReport {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::info!(evaluation_id = %id, name, cases = cases.len(), "starting evaluation");

        let mut case_results = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            let results = self
                .evaluate_single(
                    &case.question,
                    case.expected_answer.as_deref(),
                    &case.actual_answer,
                )
                .await;
            case_results.push(CaseResult {
                question: case.question.clone(),
                results,
            });
            if (i + 1) % 10 == 0 {
                tracing::debug!(done = i + 1, total = cases.len(), "evaluation progress");
            }
        }

        let mut per_metric: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut passed = 0usize;
        let mut scored = 0usize;
        for result in case_results.iter().flat_map(|c| &c.results) {
            per_metric
                .entry(result.metric.clone())
                .or_default()
                .push(result.score);
            scored += 1;
            if result.passed {
                passed += 1;
            }
        }

        let metric_means: BTreeMap<String, f64> = per_metric
            .into_iter()
            .map(|(name, scores)| (name, mean(&scores)))
            .collect();
        let overall_score = (!metric_means.is_empty())
            .then(|| mean(&metric_means.values().copied().collect::<Vec<_>>()));
        let pass_rate = if scored == 0 {
            0.0
        } else {
            passed as f64 / scored as f64
        };

        tracing::info!(
            evaluation_id = %id,
            overall_score = ?overall_score,
            pass_rate,
            "evaluation complete"
        );

        EvaluationReport {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
            total_cases: cases.len(),
            cases: case_results,
            metric_means,
            overall_score,
            pass_rate,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Load cases from a JSON list or a `{"test_set": [...]}` object
pub fn load_test_set(path: impl AsRef<Path>) -> Result<Vec<TestCase>> {
    let path = path.as_ref();
    let data: Value = serde_json::from_slice(&std::fs::read(path)?)?;
    let cases = match data {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) if map.contains_key("test_set") => {
            map.remove("test_set").unwrap_or(Value::Null)
        }
        _ => {
            return Err(RagError::validation(format!(
                "invalid test set format in {}",
                path.display()
            ))
            .with_details(json!({ "path": path.display().to_string() })))
        }
    };
    let cases: Vec<TestCase> = serde_json::from_value(cases)?;
    tracing::debug!(path = %path.display(), cases = cases.len(), "loaded test set");
    Ok(cases)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: String,
    pub baseline: Option<f64>,
    pub candidate: Option<f64>,
    pub delta: Option<f64>,
}

/// Metric-by-metric difference between two reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportComparison {
    pub baseline_id: String,
    pub candidate_id: String,
    pub metrics: Vec<MetricDelta>,
    pub overall_delta: Option<f64>,
    pub pass_rate_delta: f64,
}

pub fn compare_reports(baseline: &EvaluationReport, candidate: &EvaluationReport) -> ReportComparison {
    let mut names: Vec<&String> = baseline
        .metric_means
        .keys()
        .chain(candidate.metric_means.keys())
        .collect();
    names.sort();
    names.dedup();

    let metrics = names
        .into_iter()
        .map(|name| {
            let b = baseline.metric_means.get(name).copied();
            let c = candidate.metric_means.get(name).copied();
            MetricDelta {
                metric: name.clone(),
                baseline: b,
                candidate: c,
                delta: b.zip(c).map(|(b, c)| c - b),
            }
        })
        .collect();

    ReportComparison {
        baseline_id: baseline.id.clone(),
        candidate_id: candidate.id.clone(),
        metrics,
        overall_delta: baseline
            .overall_score
            .zip(candidate.overall_score)
            .map(|(b, c)| c - b),
        pass_rate_delta: candidate.pass_rate - baseline.pass_rate,
    }
}
