//! HTML → [`DocumentStructure`] extraction.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};

use siteadvisor_shared::{DocumentStructure, term_frequencies, tokenize};

use crate::headings::HeadingTreeBuilder;

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));
static HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector"));

/// Elements whose text never counts as page content.
const NON_CONTENT: &[&str] = &["script", "style", "noscript"];

/// Extract the structural representation of an HTML page.
///
/// Parsing is lenient: malformed markup still yields a structure, and a page
/// without a `<title>` is titled by its URL.
pub fn parse_document(url: &str, html: &str) -> DocumentStructure {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    let description = doc
        .select(&META_DESCRIPTION)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let mut builder = HeadingTreeBuilder::new();
    for el in doc.select(&HEADINGS) {
        let level: u8 = el.value().name()[1..].parse().unwrap_or(1);
        builder.push(level, element_text(&el));
    }
    let (headings, heading_tree) = builder.finish();

    let h1s = headings
        .iter()
        .filter(|h| h.level == 1)
        .map(|h| h.text.clone())
        .collect();

    let main_text = extract_main_text(&doc);
    let tokens = tokenize(&main_text);
    let word_count = tokens.len();
    let term_freq = term_frequencies(&tokens);

    DocumentStructure {
        url: url.to_string(),
        title,
        description,
        h1s,
        headings,
        heading_tree,
        main_text,
        word_count,
        term_freq,
        content_hash: Some(compute_hash(html)),
        degenerate: false,
    }
}

/// Every text node outside non-content elements, whitespace collapsed.
fn extract_main_text(doc: &Html) -> String {
    let mut raw = String::new();

    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| NON_CONTENT.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        raw.push_str(text);
        raw.push(' ');
    }

    collapse_whitespace(&raw)
}

fn element_text(el: &ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of the raw markup.
pub(crate) fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
