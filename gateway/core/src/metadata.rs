//! Citation Extraction
//!
//! The agent embeds knowledge-base references as `"metadata":{...}` objects
//! inside its trace frames. These are located with plain patterns over the
//! joined segment text rather than parsed as JSON, since they sit inside
//! partially binary frames.
//!
//! A block ends at its first `}`, so values containing a literal `}` are cut
//! short and usually lose a field.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static METADATA_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""metadata":\{[^}]+\}"#).expect("metadata block pattern"));
static TITLE_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""title":"([^"]+)""#).expect("title pattern"));
static CATEGORY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""category":"([^"]+)""#).expect("category pattern"));
static URL_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""url":"(https://[^"]+)""#).expect("url pattern"));

/// A source document the agent referred to while answering
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CitationRecord {
    /// Document title
    pub title: String,
    /// Document category
    pub category: String,
    /// Document link, always `https://`
    pub url: String,
}

impl CitationRecord {
    /// Create a citation record
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            url: url.into(),
        }
    }
}

/// Extract citations from decoded message segments
///
/// Segments are joined with a space before matching, so a block is found
/// regardless of which segment it arrived in. Blocks missing any of `title`,
/// `category` or an `https://` `url` are skipped. Repeated triples keep only
/// their first occurrence.
pub fn extract_citations<S: AsRef<str>>(segments: &[S]) -> Vec<CitationRecord> {
    let combined = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ");
    extract_from_text(&combined)
}

/// Extract citations from a single block of text
pub fn extract_from_text(text: &str) -> Vec<CitationRecord> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();

    for block in METADATA_BLOCK.find_iter(text) {
        let Some(record) = parse_block(block.as_str()) else {
            tracing::trace!(block = block.as_str(), "Skipping incomplete metadata block");
            continue;
        };
        if seen.insert(record.clone()) {
            citations.push(record);
        }
    }

    citations
}

fn parse_block(block: &str) -> Option<CitationRecord> {
    let capture = |pattern: &Regex| {
        pattern
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    Some(CitationRecord {
        title: capture(&TITLE_FIELD)?,
        category: capture(&CATEGORY_FIELD)?,
        url: capture(&URL_FIELD)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(title: &str, category: &str, url: &str) -> String {
        format!(r#""metadata":{{"title":"{title}","category":"{category}","url":"{url}"}}"#)
    }

    #[test]
    fn test_duplicate_blocks_collapse_in_first_seen_order() {
        let segments = vec![
            format!("trace {}", block("A", "C", "https://x")),
            block("B", "D", "https://y"),
            format!("{} tail", block("A", "C", "https://x")),
        ];

        let citations = extract_citations(&segments);
        assert_eq!(
            citations,
            vec![
                CitationRecord::new("A", "C", "https://x"),
                CitationRecord::new("B", "D", "https://y"),
            ]
        );
    }

    #[test]
    fn test_incomplete_block_does_not_stop_extraction() {
        let text = format!(
            r#"{} "metadata":{{"title":"NoUrl","category":"C"}} {} {}"#,
            block("First", "C", "https://a"),
            r#""metadata":{"category":"C","url":"https://b"}"#,
            block("Last", "C", "https://c"),
        );

        let citations = extract_from_text(&text);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].title, "First");
        assert_eq!(citations[1].title, "Last");
    }

    #[test]
    fn test_non_https_url_is_skipped() {
        let text = block("Plain", "C", "http://insecure");
        assert!(extract_from_text(&text).is_empty());
    }

    #[test]
    fn test_field_order_inside_block_is_irrelevant() {
        let text = r#""metadata":{"url":"https://z","category":"Guides","x-amz":"1","title":"Setup"}"#;
        assert_eq!(
            extract_from_text(text),
            vec![CitationRecord::new("Setup", "Guides", "https://z")]
        );
    }

    #[test]
    fn test_closing_brace_in_value_truncates_block() {
        let text = r#""metadata":{"title":"a}b","category":"C","url":"https://x"}"#;
        assert!(extract_from_text(text).is_empty());
    }

    #[test]
    fn test_block_split_across_segments_is_found_after_join() {
        let segments = [r#"noise "metadata":{"title":"T","#, r#""category":"C","url":"https://u"}"#];
        let citations = extract_citations(&segments);
        assert_eq!(citations, vec![CitationRecord::new("T", "C", "https://u")]);
    }

    #[test]
    fn test_same_title_different_url_is_distinct() {
        let text = format!(
            "{} {}",
            block("Doc", "C", "https://one"),
            block("Doc", "C", "https://two")
        );
        assert_eq!(extract_from_text(&text).len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let record = CitationRecord::new("A", "C", "https://x");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"title": "A", "category": "C", "url": "https://x"})
        );
    }
}
