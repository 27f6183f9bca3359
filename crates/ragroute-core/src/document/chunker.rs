//! Document chunking for embedding
//!
//! Every chunk is an exact slice of the source text. Consecutive chunks
//! either touch or overlap, and [`DocumentChunk::overlap`] records how many
//! bytes a chunk shares with its predecessor, so [`reassemble`] recovers the
//! source exactly.

use crate::error::{RagError, Result};
use crate::vectors::Metadata;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

lazy_static! {
    /// Sentence terminator (with closing quotes/brackets) plus trailing whitespace,
    /// or a paragraph break
    static ref SENTENCE_END: Regex = Regex::new(r#"[.!?]+["')\]]*\s+|\n{2,}"#).unwrap();
    static ref TOKEN: Regex = Regex::new(r"\S+\s*").unwrap();
}

/// How text is split into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// `chunk_size` characters per chunk
    Fixed,
    /// Whole sentences up to `chunk_size` characters
    #[default]
    Sentence,
    /// `chunk_size` whitespace-delimited tokens per chunk
    Token,
}

impl ChunkStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Sentence => "sentence",
            Self::Token => "token",
        }
    }
}

impl FromStr for ChunkStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "sentence" => Ok(Self::Sentence),
            "token" => Ok(Self::Token),
            other => Err(RagError::validation(format!(
                "Unknown chunking strategy: '{}'. Expected fixed, sentence or token",
                other
            ))
            .with_details(json!({ "strategy": other }))),
        }
    }
}

/// Contiguous span of a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Zero-based position within the document
    pub index: usize,
    pub text: String,
    /// Byte offset of the span in the source
    pub start: usize,
    /// Byte offset one past the span
    pub end: usize,
    /// Leading bytes repeated from the previous chunk
    pub overlap: usize,
    pub metadata: Metadata,
}

/// Splits text under a [`ChunkStrategy`]
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkStrategy,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            strategy: ChunkStrategy::default(),
        }
    }
}

impl Chunker {
    /// Fails with a validation error unless `0 <= chunk_overlap < chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize, strategy: ChunkStrategy) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            ))
            .with_details(json!({
                "chunk_size": chunk_size,
                "chunk_overlap": chunk_overlap,
            })));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            strategy,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    pub fn chunk(&self, text: &str) -> Vec<DocumentChunk> {
        self.chunk_with_metadata(text, &Metadata::new())
    }

    /// Chunk `text`, copying `metadata` into every chunk
    pub fn chunk_with_metadata(&self, text: &str, metadata: &Metadata) -> Vec<DocumentChunk> {
        let spans = match self.strategy {
            ChunkStrategy::Fixed => window(&char_bounds(text), self.chunk_size, self.chunk_overlap),
            ChunkStrategy::Token => {
                window(&token_bounds(text), self.chunk_size, self.chunk_overlap)
            }
            ChunkStrategy::Sentence => self.sentence_spans(text),
        };

        let mut prev_end = 0;
        spans
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let overlap = if index == 0 { 0 } else { prev_end - start };
                prev_end = end;

                let mut meta = metadata.clone();
                meta.insert("chunk_index".into(), json!(index));
                DocumentChunk {
                    index,
                    text: text[start..end].to_string(),
                    start,
                    end,
                    overlap,
                    metadata: meta,
                }
            })
            .collect()
    }

    /// Greedy sentence packing. A closed chunk's trailing `chunk_overlap`
    /// characters open the next one, shrunk when the next sentence would not
    /// fit alongside them. Sentences longer than `chunk_size` are hard-split.
    fn sentence_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let size = self.chunk_size;
        let mut spans = Vec::new();
        let mut start = 0;
        let mut end = 0;
        let mut len = 0;

        for (a, b) in sentence_bounds(text) {
            let sentence_len = text[a..b].chars().count();

            if len + sentence_len <= size {
                end = b;
                len += sentence_len;
                continue;
            }

            if end > start {
                spans.push((start, end));
                let carry = self
                    .chunk_overlap
                    .min(size.saturating_sub(sentence_len))
                    .min(text[start..end].chars().count());
                start = back_chars(text, end, carry);
                len = carry;
            } else {
                start = a;
                len = 0;
            }

            if len + sentence_len <= size {
                end = b;
                len += sentence_len;
                continue;
            }

            // Only an oversized sentence reaches here, with nothing carried
            let mut bounds = char_bounds(&text[a..b]);
            for offset in &mut bounds {
                *offset += a;
            }
            let mut windows = window(&bounds, size, self.chunk_overlap);
            if let Some((last_start, last_end)) = windows.pop() {
                spans.extend(windows);
                start = last_start;
                end = last_end;
                len = text[last_start..last_end].chars().count();
            }
        }

        if end > start {
            spans.push((start, end));
        }
        spans
    }
}

/// Rebuild the source from its chunks by dropping each chunk's overlap
pub fn reassemble(chunks: &[DocumentChunk]) -> String {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&chunk.text[chunk.overlap..]);
    }
    out
}

/// Byte offset of every char start, plus the text length
fn char_bounds(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// Token units: each token with its trailing whitespace, leading whitespace
/// folded into the first unit
fn token_bounds(text: &str) -> Vec<usize> {
    if text.is_empty() {
        return vec![0];
    }
    let mut bounds = vec![0];
    bounds.extend(TOKEN.find_iter(text).skip(1).map(|m| m.start()));
    bounds.push(text.len());
    bounds
}

/// Sentence spans covering the whole text
fn sentence_bounds(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        spans.push((start, m.end()));
        start = m.end();
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// Sliding windows of `size` units stepping by `size - overlap`.
/// `bounds[i]..bounds[i + 1]` is unit `i`.
fn window(bounds: &[usize], size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let units = bounds.len().saturating_sub(1);
    let mut spans = Vec::new();
    if units == 0 {
        return spans;
    }

    let mut s = 0;
    loop {
        let e = (s + size).min(units);
        spans.push((bounds[s], bounds[e]));
        if e == units {
            break;
        }
        s = e - overlap;
    }
    spans
}

/// Byte offset `n` characters before `end`
fn back_chars(text: &str, end: usize, n: usize) -> usize {
    if n == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "The tortoise is slow. The hare is fast! Who wins the race? \
                        The tortoise, because the hare naps.";

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(Chunker::new(100, 100, ChunkStrategy::Fixed).is_err());
        assert!(Chunker::new(100, 150, ChunkStrategy::Sentence).is_err());
        assert!(Chunker::new(0, 0, ChunkStrategy::Token).is_err());
        let err = Chunker::new(10, 10, ChunkStrategy::Fixed).unwrap_err();
        assert!(matches!(err, RagError::Validation { .. }));
    }

    #[test]
    fn test_fixed_chunks_and_overlap() {
        let chunker = Chunker::new(10, 3, ChunkStrategy::Fixed).unwrap();
        let chunks = chunker.chunk("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "hijklmnopq");
        assert_eq!(chunks[1].overlap, 3);
        assert_eq!(chunks.last().unwrap().text, "vwxyz");
        assert_eq!(reassemble(&chunks), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn test_sentence_chunks_keep_sentences_whole() {
        let chunker = Chunker::new(45, 10, ChunkStrategy::Sentence).unwrap();
        let chunks = chunker.chunk(TEXT);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 45);
        }
        assert!(chunks[0].text.starts_with("The tortoise is slow. The hare is fast! "));
        assert_eq!(reassemble(&chunks), TEXT);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.metadata["chunk_index"], i);
        }
    }

    #[test]
    fn test_sentence_carries_overlap() {
        let chunker = Chunker::new(30, 5, ChunkStrategy::Sentence).unwrap();
        let chunks = chunker.chunk("First one here. Second one here. Third.");
        assert!(chunks.len() >= 2);
        assert!(chunks[1].overlap > 0);
        assert_eq!(
            reassemble(&chunks),
            "First one here. Second one here. Third."
        );
    }

    #[test]
    fn test_oversized_sentence_is_hard_split() {
        let long = "a".repeat(25);
        let text = format!("Short. {} End.", long);
        let chunker = Chunker::new(10, 2, ChunkStrategy::Sentence).unwrap();
        let chunks = chunker.chunk(&text);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_whole_document_fits_one_chunk() {
        let chunks = Chunker::default().chunk(TEXT);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, TEXT);
    }

    #[test]
    fn test_token_strategy_counts_words() {
        let chunker = Chunker::new(3, 1, ChunkStrategy::Token).unwrap();
        let text = "  one two three four five";
        let chunks = chunker.chunk(text);
        assert_eq!(chunks[0].text, "  one two three ");
        assert_eq!(chunks[1].text, "three four five");
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_unicode_boundaries() {
        let text = "Grüße aus Köln! 日本語のテキスト。 Emoji 🎉 here.";
        for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Sentence, ChunkStrategy::Token] {
            let chunker = Chunker::new(7, 2, strategy).unwrap();
            assert_eq!(reassemble(&chunker.chunk(text)), text);
        }
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(Chunker::default().chunk("").is_empty());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Sentence".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Sentence);
        assert!("paragraph".parse::<ChunkStrategy>().is_err());
    }
}
