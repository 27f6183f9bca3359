//! Context assembly and prompt construction

use super::SourceRef;

/// Answering instruction used when the caller supplies none
pub const DEFAULT_INSTRUCTION: &str = "Use the following context to answer the question. \
     If the context doesn't contain enough information, say so.";

/// System note sent when retrieval returned nothing
pub const NO_CONTEXT_NOTE: &str = "No relevant context found in the document store for this \
     question. Say so if you cannot answer from general knowledge.";

/// Take sources in order until `window` characters are used.
///
/// The first source is always kept, even when it alone exceeds the window.
pub fn select_context(sources: Vec<SourceRef>, window: usize) -> Vec<SourceRef> {
    let mut used = 0;
    let mut selected = Vec::with_capacity(sources.len());
    for source in sources {
        let len = source.text.chars().count();
        if !selected.is_empty() && used + len > window {
            break;
        }
        used += len;
        selected.push(source);
    }
    selected
}

fn source_label(position: usize, source: &SourceRef) -> String {
    let mut label = format!("[Source {}] id={}", position + 1, source.id);
    if let Some(name) = source.metadata.get("filename").and_then(|v| v.as_str()) {
        label.push_str(&format!(" file={}", name));
    }
    if let Some(section) = source.metadata.get("section_title").and_then(|v| v.as_str()) {
        label.push_str(&format!(" section={}", section));
    }
    label
}

/// Prompt with tagged context blocks followed by the question
pub fn build_prompt(question: &str, sources: &[SourceRef], instruction: Option<&str>) -> String {
    let context = if sources.is_empty() {
        "(none)".to_string()
    } else {
        sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}\n{}", source_label(i, s), s.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        instruction.unwrap_or(DEFAULT_INSTRUCTION),
        context,
        question
    )
}
