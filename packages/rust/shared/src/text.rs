//! Word tokenization shared by the HTML parser and degenerate documents.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Split text into word tokens.
///
/// A token is a maximal run of Unicode word characters, so punctuation and
/// symbols always act as separators and CJK runs stay intact.
pub fn tokenize(text: &str) -> Vec<&str> {
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\w+").expect("valid regex"));

    WORD_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Count occurrences of each token.
pub fn term_frequencies(tokens: &[&str]) -> BTreeMap<String, usize> {
    let mut freq = BTreeMap::new();
    for token in tokens {
        *freq.entry((*token).to_string()).or_insert(0) += 1;
    }
    freq
}
