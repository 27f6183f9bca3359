//! Evaluation commands

use crate::app::{EvalAction, EvalArgs, OutputFormat};
use crate::output::{json, terminal};
use anyhow::Result;
use ragroute_core::eval::{
    build_metrics, compare_reports, load_test_set, EvaluationReport, Evaluator, TestCase,
    ANSWER_RELEVANCE, SEMANTIC_SIMILARITY,
};
use ragroute_core::{build_embedder, Config, ModelRouter, RagRequest, RagService};
use std::path::Path;

pub async fn run(args: EvalArgs, config: Config, format: OutputFormat) -> Result<()> {
    match args.action {
        EvalAction::Run {
            test_set,
            metrics,
            name,
            output,
            answer,
        } => {
            let mut cases = load_test_set(&test_set)?;
            if answer {
                fill_answers(&mut cases, config.clone()).await?;
            }

            let wants = |metric: &str| metrics.iter().any(|m| m == metric);
            let embedder = if wants(SEMANTIC_SIMILARITY) {
                Some(build_embedder(&config.embedding)?)
            } else {
                None
            };
            let judge = if wants(ANSWER_RELEVANCE) {
                Some(ModelRouter::new(config.llm.clone()).client(None)?)
            } else {
                None
            };

            let evaluator = Evaluator::new(build_metrics(&metrics, embedder, judge)?);
            let report = evaluator.evaluate_batch(&name, &cases).await;
            if let Some(ref path) = output {
                report.save(path)?;
            }

            match format {
                OutputFormat::Json => print!("{}", json::format_value(&report)),
                OutputFormat::Cli => {
                    print!("{}", terminal::format_report(&report));
                    if let Some(path) = output {
                        println!("\nSaved report to {}", path.display());
                    }
                }
            }
        }
        EvalAction::Compare {
            baseline,
            candidate,
        } => {
            let cmp = compare_reports(&load_report(&baseline)?, &load_report(&candidate)?);
            match format {
                OutputFormat::Json => print!("{}", json::format_value(&cmp)),
                OutputFormat::Cli => print!("{}", terminal::format_comparison(&cmp)),
            }
        }
    }
    Ok(())
}

fn load_report(path: &Path) -> Result<EvaluationReport> {
    Ok(EvaluationReport::load(path)?)
}

/// Query the knowledge base for every case that has no answer yet
async fn fill_answers(cases: &mut [TestCase], config: Config) -> Result<()> {
    let service = RagService::from_config(config)?;
    for case in cases.iter_mut().filter(|c| c.actual_answer.trim().is_empty()) {
        let outcome = service.query(&RagRequest::new(case.question.clone())).await?;
        case.context = Some(
            outcome
                .answer
                .sources
                .iter()
                .map(|s| s.text.clone())
                .collect(),
        );
        case.actual_answer = outcome.answer.answer;
    }
    Ok(())
}
