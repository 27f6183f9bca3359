//! Answer quality metrics

use super::EvaluationResult;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::{RagError, Result, GENERIC_PROVIDER_STATUS};
use crate::llm::{AskOptions, ModelClient};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub const EXACT_MATCH: &str = "exact_match";
pub const TOKEN_F1: &str = "token_f1";
pub const SEMANTIC_SIMILARITY: &str = "semantic_similarity";
pub const ANSWER_RELEVANCE: &str = "answer_relevance";

lazy_static! {
    static ref RATING: Regex = Regex::new(r"\b(10(?:\.0+)?|\d(?:\.\d+)?)\b").unwrap();
}

/// Scores one answer against a question and an optional reference answer
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum score that counts as a pass
    fn threshold(&self) -> f64;

    async fn evaluate(
        &self,
        question: &str,
        expected: Option<&str>,
        actual: &str,
    ) -> Result<EvaluationResult>;
}

fn missing_expected(metric: &str, threshold: f64) -> EvaluationResult {
    EvaluationResult::new(metric, 0.0, threshold, "no expected answer provided")
}

/// Lower-case, collapse whitespace
pub fn normalize_answer(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-cased tokens with punctuation removed
pub fn answer_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// (precision, recall, f1) over token multisets
pub fn token_f1(expected: &str, actual: &str) -> (f64, f64, f64) {
    let expected = answer_tokens(expected);
    let actual = answer_tokens(actual);
    if expected.is_empty() || actual.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for token in &expected {
        *counts.entry(token.as_str()).or_default() += 1;
    }
    let mut common = 0usize;
    for token in &actual {
        if let Some(n) = counts.get_mut(token.as_str()) {
            if *n > 0 {
                *n -= 1;
                common += 1;
            }
        }
    }

    let precision = common as f64 / actual.len() as f64;
    let recall = common as f64 / expected.len() as f64;
    if precision + recall == 0.0 {
        return (precision, recall, 0.0);
    }
    (precision, recall, 2.0 * precision * recall / (precision + recall))
}

/// Normalized string equality
#[derive(Debug, Clone)]
pub struct ExactMatch {
    threshold: f64,
}

impl Default for ExactMatch {
    fn default() -> Self {
        Self { threshold: 1.0 }
    }
}

impl ExactMatch {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Metric for ExactMatch {
    fn name(&self) -> &str {
        EXACT_MATCH
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    async fn evaluate(
        &self,
        _question: &str,
        expected: Option<&str>,
        actual: &str,
    ) -> Result<EvaluationResult> {
        let Some(expected) = expected else {
            return Ok(missing_expected(EXACT_MATCH, self.threshold));
        };
        let matched = normalize_answer(expected) == normalize_answer(actual);
        let score = if matched { 1.0 } else { 0.0 };
        let explanation = if matched {
            "answer matches the expected answer"
        } else {
            "answer differs from the expected answer"
        };
        Ok(EvaluationResult::new(EXACT_MATCH, score, self.threshold, explanation)
            .with_details(json!({ "expected": expected, "actual": actual, "match": matched })))
    }
}

/// Token overlap F1
#[derive(Debug, Clone)]
pub struct TokenF1 {
    threshold: f64,
}

impl Default for TokenF1 {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl TokenF1 {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Metric for TokenF1 {
    fn name(&self) -> &str {
        TOKEN_F1
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    async fn evaluate(
        &self,
        _question: &str,
        expected: Option<&str>,
        actual: &str,
    ) -> Result<EvaluationResult> {
        let Some(expected) = expected else {
            return Ok(missing_expected(TOKEN_F1, self.threshold));
        };
        let (precision, recall, f1) = token_f1(expected, actual);
        Ok(EvaluationResult::new(
            TOKEN_F1,
            f1,
            self.threshold,
            format!("precision {:.3}, recall {:.3}", precision, recall),
        )
        .with_details(json!({
            "precision": precision,
            "recall": recall,
            "expected_tokens": answer_tokens(expected).len(),
            "actual_tokens": answer_tokens(actual).len(),
        })))
    }
}

/// Cosine similarity of expected and actual answer embeddings.
///
/// Partial without an embedder: every case scores 0.0.
#[derive(Clone)]
pub struct SemanticSimilarity {
    embedder: Option<Arc<dyn Embedder>>,
    threshold: f64,
}

impl SemanticSimilarity {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            embedder,
            threshold: 0.8,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl Metric for SemanticSimilarity {
    fn name(&self) -> &str {
        SEMANTIC_SIMILARITY
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    async fn evaluate(
        &self,
        _question: &str,
        expected: Option<&str>,
        actual: &str,
    ) -> Result<EvaluationResult> {
        let Some(expected) = expected else {
            return Ok(missing_expected(SEMANTIC_SIMILARITY, self.threshold));
        };
        let Some(embedder) = &self.embedder else {
            return Ok(EvaluationResult::new(
                SEMANTIC_SIMILARITY,
                0.0,
                self.threshold,
                "partial metric: no embedder configured",
            )
            .with_details(json!({ "partial": true })));
        };

        let vectors = embedder
            .embed_batch(&[expected.to_string(), actual.to_string()])
            .await?;
        let similarity = match vectors.as_slice() {
            [a, b] => cosine_similarity(a, b),
            _ => {
                return Err(RagError::provider(
                    embedder.provider(),
                    GENERIC_PROVIDER_STATUS,
                    "embedder returned the wrong number of vectors",
                ))
            }
        };
        let score = f64::from(similarity).clamp(0.0, 1.0);
        Ok(EvaluationResult::new(
            SEMANTIC_SIMILARITY,
            score,
            self.threshold,
            format!("cosine similarity {:.3} ({})", similarity, embedder.model_name()),
        )
        .with_details(json!({ "cosine": similarity, "model": embedder.model_name() })))
    }
}

/// Model-judged relevance of the answer to the question, rated 0-10.
///
/// Partial without a model client: every case scores 0.0.
#[derive(Clone)]
pub struct AnswerRelevance {
    judge: Option<Arc<dyn ModelClient>>,
    threshold: f64,
}

impl AnswerRelevance {
    pub fn new(judge: Option<Arc<dyn ModelClient>>) -> Self {
        Self {
            judge,
            threshold: 0.7,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

fn relevance_prompt(question: &str, answer: &str) -> String {
    format!(
        "Rate how relevant the answer is to the question on a scale from 0 to 10, \
         where 0 is unrelated and 10 fully addresses the question. \
         Reply with the number only.\n\nQuestion: {}\n\nAnswer: {}\n\nRating:",
        question, answer
    )
}

/// First 0-10 number in a judge reply
pub(crate) fn parse_rating(reply: &str) -> Option<f64> {
    RATING
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|r| (0.0..=10.0).contains(r))
}

#[async_trait]
impl Metric for AnswerRelevance {
    fn name(&self) -> &str {
        ANSWER_RELEVANCE
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    async fn evaluate(
        &self,
        question: &str,
        _expected: Option<&str>,
        actual: &str,
    ) -> Result<EvaluationResult> {
        let Some(judge) = &self.judge else {
            return Ok(EvaluationResult::new(
                ANSWER_RELEVANCE,
                0.0,
                self.threshold,
                "partial metric: no model client configured",
            )
            .with_details(json!({ "partial": true })));
        };

        let options = AskOptions::default().with_temperature(0.0).with_max_tokens(8);
        let reply = judge
            .ask(&relevance_prompt(question, actual), &options)
            .await?;
        let rating = parse_rating(&reply.content).ok_or_else(|| {
            RagError::provider(
                judge.provider(),
                GENERIC_PROVIDER_STATUS,
                format!("could not read a 0-10 rating from: {:?}", reply.content),
            )
        })?;

        Ok(EvaluationResult::new(
            ANSWER_RELEVANCE,
            rating / 10.0,
            self.threshold,
            format!("judged {}/10 by {}", rating, reply.model),
        )
        .with_details(json!({ "rating": rating, "judge_model": reply.model })))
    }
}
