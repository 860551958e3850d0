//! Answer rendering for text surfaces.
//!
//! Appends either a Markdown reference list or a "no references" notice to an
//! answer. The web widget renders citations itself from the JSON reply.

use crate::metadata::CitationRecord;

const REFERENCES_INTRO: &str = "This answer is generated by referring to our documentation below.\n\n\
Feel free to ask follow-up questions or see the references:";

/// Render an answer followed by its references
///
/// With citations, each is listed as `- **{title}** [Link]({url})`. Without,
/// the user is pointed at `support_contact` to confirm the content.
#[must_use]
pub fn render_answer(answer: &str, citations: &[CitationRecord], support_contact: &str) -> String {
    let mut rendered = String::from(answer);
    rendered.push_str("\n\n");

    if citations.is_empty() {
        rendered.push_str(&format!(
            "This answer does not contain references from our documentation.\n\n\
             Please contact {support_contact} to confirm the credibility of the content, \
             or ask more questions.\n"
        ));
        return rendered;
    }

    rendered.push_str(REFERENCES_INTRO);
    rendered.push('\n');
    for link in citation_links(citations) {
        rendered.push_str(&link);
        rendered.push('\n');
    }
    rendered
}

/// One Markdown list item per citation
#[must_use]
pub fn citation_links(citations: &[CitationRecord]) -> Vec<String> {
    citations
        .iter()
        .map(|c| format!("- **{}** [Link]({})", c.title, c.url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_with_references() {
        let citations = vec![
            CitationRecord::new("Install Guide", "Docs", "https://docs/install"),
            CitationRecord::new("FAQ", "Support", "https://docs/faq"),
        ];

        let rendered = render_answer("Use the installer.", &citations, "help@example.com");
        assert!(rendered.starts_with("Use the installer.\n\n"));
        assert!(rendered.contains(REFERENCES_INTRO));
        assert!(rendered.ends_with(
            "- **Install Guide** [Link](https://docs/install)\n- **FAQ** [Link](https://docs/faq)\n"
        ));
        assert!(!rendered.contains("help@example.com"));
    }

    #[test]
    fn test_render_without_references() {
        let rendered = render_answer("Not sure.", &[], "help@example.com");
        assert!(rendered.contains("does not contain references"));
        assert!(rendered.contains("Please contact help@example.com"));
    }

    #[test]
    fn test_citation_links() {
        let links = citation_links(&[CitationRecord::new("A", "C", "https://x")]);
        assert_eq!(links, vec!["- **A** [Link](https://x)".to_string()]);
    }
}
