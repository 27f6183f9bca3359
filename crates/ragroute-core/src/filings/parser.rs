//! Filing HTML to text, and "Item N" section extraction

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Sections shorter than this are cross references, not content
const MIN_SECTION_CHARS: usize = 200;

pub const FULL_DOCUMENT: &str = "Full Document";

lazy_static! {
    static ref HIDDEN: Regex = Regex::new(
        r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>|<!--.*?-->"
    )
    .unwrap();
    static ref INLINE_TAG: Regex = Regex::new(
        r"(?i)</?(?:a|b|i|u|em|strong|span|font|sup|sub|small|big|ix:[a-z]+)\b[^>]*>"
    )
    .unwrap();
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").unwrap();
    static ref SPACES: Regex = Regex::new(r"[ \t\u{a0}]+").unwrap();
    static ref ITEM: Regex = Regex::new(r"(?i)\bitem\s+\d+[a-z]?\b\.?").unwrap();
}

/// A titled span of filing text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingSection {
    pub title: String,
    pub text: String,
}

fn decode_entity(caps: &Captures<'_>) -> String {
    let name = &caps[1];
    let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        match name {
            "nbsp" => Some(' '),
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "lsquo" => Some('\u{2018}'),
            "rsquo" => Some('\u{2019}'),
            "ldquo" => Some('\u{201c}'),
            "rdquo" => Some('\u{201d}'),
            "ndash" => Some('\u{2013}'),
            "mdash" => Some('\u{2014}'),
            "hellip" => Some('\u{2026}'),
            "copy" => Some('\u{a9}'),
            "reg" => Some('\u{ae}'),
            "trade" => Some('\u{2122}'),
            "sect" => Some('\u{a7}'),
            "bull" => Some('\u{2022}'),
            _ => None,
        }
    };
    decoded
        .map(String::from)
        .unwrap_or_else(|| caps[0].to_string())
}

/// Plain text of an HTML document, one trimmed non-empty line per text block
pub fn html_to_text(html: &str) -> String {
    let visible = HIDDEN.replace_all(html, " ");
    let inline = INLINE_TAG.replace_all(&visible, " ");
    let blocks = TAG.replace_all(&inline, "\n");
    let decoded = ENTITY.replace_all(&blocks, decode_entity);

    decoded
        .lines()
        .map(|line| SPACES.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split text at "Item N" headings.
///
/// Falls back to a single "Full Document" section when no heading yields a
/// section of useful length.
pub fn extract_sections(text: &str) -> Vec<FilingSection> {
    let matches: Vec<_> = ITEM.find_iter(text).collect();
    let full = || {
        vec![FilingSection {
            title: FULL_DOCUMENT.to_string(),
            text: text.to_string(),
        }]
    };
    if matches.is_empty() {
        return full();
    }

    let mut sections = Vec::new();
    for (i, m) in matches.iter().enumerate() {
        let end = matches.get(i + 1).map(|n| n.start()).unwrap_or(text.len());
        let body = text[m.start()..end].trim();
        if body.chars().count() < MIN_SECTION_CHARS {
            continue;
        }
        sections.push(FilingSection {
            title: m.as_str().trim().replace('\n', " "),
            text: body.to_string(),
        });
    }

    if sections.is_empty() {
        return full();
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_markup() {
        let html = r#"<html><head><style>p { color: red }</style>
            <script>var x = "<b>";</script></head>
            <body><p>Apple&nbsp;Inc. &amp; subsidiaries</p><!-- note -->
            <div>Net <b>sales</b> rose &#8212; 3%</div><noscript>enable js</noscript></body></html>"#;
        let text = html_to_text(html);
        assert_eq!(text, "Apple Inc. & subsidiaries\nNet sales rose \u{2014} 3%");
    }

    #[test]
    fn test_unknown_entity_is_kept() {
        assert_eq!(html_to_text("<p>a &bogus; b</p>"), "a &bogus; b");
    }

    #[test]
    fn test_extract_sections_by_item() {
        let body = "x".repeat(250);
        let text = format!(
            "Table of contents\nItem 1. Business\n{}\nItem 1A. Risk Factors\nsee below\nItem 7. MD&A\n{}",
            body, body
        );
        let sections = extract_sections(&text);
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Item 1.", "Item 7."]);
        assert!(sections[0].text.starts_with("Item 1. Business"));
    }

    #[test]
    fn test_extract_sections_fallback() {
        let sections = extract_sections("Short filing without headings.");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, FULL_DOCUMENT);

        let only_short = extract_sections("Item 1. tiny\nItem 2. tiny");
        assert_eq!(only_short[0].title, FULL_DOCUMENT);
    }
}
