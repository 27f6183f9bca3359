//! Terminal output formatter

use ragroute_core::db::{ChunkRef, DocumentRecord, QueryRecord};
use ragroute_core::eval::{EvaluationReport, ReportComparison};
use ragroute_core::{FilingSearchResult, SourceRef};

const PREVIEW_LINES: usize = 3;

fn one_line(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

pub fn format_documents(docs: &[DocumentRecord]) -> String {
    if docs.is_empty() {
        return "No documents\n".to_string();
    }
    let mut output = String::new();
    for doc in docs {
        output.push_str(&format!(
            "{}  {:<10} {:>4} chunks  {}  {}\n",
            doc.id,
            doc.status.as_str(),
            doc.chunks_count,
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.filename
        ));
    }
    output
}

pub fn format_document(doc: &DocumentRecord, chunks: Option<&[ChunkRef]>) -> String {
    let mut output = String::new();
    output.push_str(&format!("ID:        {}\n", doc.id));
    output.push_str(&format!("Filename:  {}\n", doc.filename));
    output.push_str(&format!("Type:      {} ({})\n", doc.file_type, doc.source_type));
    output.push_str(&format!("Size:      {} bytes\n", doc.file_size));
    output.push_str(&format!("Status:    {}\n", doc.status));
    output.push_str(&format!("Chunks:    {}\n", doc.chunks_count));
    if let Some(ref err) = doc.error_message {
        output.push_str(&format!("Error:     {}\n", err));
    }
    output.push_str(&format!("Created:   {}\n", doc.created_at.to_rfc3339()));
    output.push_str(&format!("Updated:   {}\n", doc.updated_at.to_rfc3339()));

    if let Some(chunks) = chunks {
        output.push('\n');
        for chunk in chunks {
            output.push_str(&format!(
                "  [{:>3}] {}  {}\n",
                chunk.chunk_index,
                chunk.vector_id,
                one_line(&chunk.preview, 80)
            ));
        }
    }
    output
}

pub fn format_sources(sources: &[SourceRef], full: bool) -> String {
    if sources.is_empty() {
        return "Sources: none\n".to_string();
    }
    let mut output = String::from("Sources:\n");
    for (i, source) in sources.iter().enumerate() {
        let file = source
            .metadata
            .get("filename")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        output.push_str(&format!(
            "  [{}] {:>3}% {} {}\n",
            i + 1,
            (source.score.max(0.0) * 100.0) as u32,
            file,
            source.id
        ));
        if full {
            let lines: Vec<&str> = source.text.lines().take(PREVIEW_LINES).collect();
            for line in &lines {
                output.push_str(&format!("      {}\n", line));
            }
            if source.text.lines().count() > PREVIEW_LINES {
                output.push_str("      ...\n");
            }
        }
    }
    output
}

pub fn format_history(records: &[QueryRecord]) -> String {
    if records.is_empty() {
        return "No queries\n".to_string();
    }
    let mut output = String::new();
    for record in records {
        let outcome = match (&record.answer, &record.error_message) {
            (_, Some(err)) => format!("failed: {}", one_line(err, 60)),
            (Some(answer), None) => one_line(answer, 60),
            (None, None) => "-".to_string(),
        };
        output.push_str(&format!(
            "{}  {}  {:>6}ms  {}\n    {}\n",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.latency_ms,
            one_line(&record.question, 60),
            outcome
        ));
    }
    output
}

pub fn format_report(report: &EvaluationReport) -> String {
    let mut output = String::new();
    output.push_str(&format!("Evaluation: {} ({})\n", report.name, report.id));
    output.push_str(&format!("Cases:      {}\n", report.total_cases));
    match report.overall_score {
        Some(score) => output.push_str(&format!("Overall:    {:.3}\n", score)),
        None => output.push_str("Overall:    -\n"),
    }
    output.push_str(&format!("Pass rate:  {:.1}%\n", report.pass_rate * 100.0));
    output.push('\n');
    for (metric, mean) in &report.metric_means {
        output.push_str(&format!("  {:<22} {:.3}\n", metric, mean));
    }
    output
}

pub fn format_comparison(cmp: &ReportComparison) -> String {
    let fmt = |v: Option<f64>| v.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into());
    let signed =
        |v: Option<f64>| v.map(|v| format!("{:+.3}", v)).unwrap_or_else(|| "-".into());

    let mut output = format!("Baseline {}  vs  candidate {}\n\n", cmp.baseline_id, cmp.candidate_id);
    output.push_str(&format!(
        "  {:<22} {:>9} {:>9} {:>9}\n",
        "metric", "baseline", "candidate", "delta"
    ));
    for m in &cmp.metrics {
        output.push_str(&format!(
            "  {:<22} {:>9} {:>9} {:>9}\n",
            m.metric,
            fmt(m.baseline),
            fmt(m.candidate),
            signed(m.delta)
        ));
    }
    output.push('\n');
    output.push_str(&format!("Overall delta:   {}\n", signed(cmp.overall_delta)));
    output.push_str(&format!("Pass rate delta: {:+.1}%\n", cmp.pass_rate_delta * 100.0));
    output
}

pub fn format_filings(hits: &[FilingSearchResult]) -> String {
    if hits.is_empty() {
        return "No filings found\n".to_string();
    }
    let mut output = String::new();
    for hit in hits {
        output.push_str(&format!(
            "{:<8} {}  cik {}  {}  {}\n",
            hit.form_type,
            hit.filed_date.as_deref().unwrap_or("----------"),
            hit.cik,
            hit.accession_number,
            hit.company_name.as_deref().unwrap_or("")
        ));
    }
    output
}
