//! Structural metric aggregation.
//!
//! Pure functions: identical documents always give identical metrics.

use std::collections::BTreeMap;

use url::Url;

use siteadvisor_shared::{CandidatePlan, DocumentStructure, PageStructureMetrics, TopicAnalysis};

/// Metrics of one document relative to `term`.
pub fn page_metrics(term: &str, doc: &DocumentStructure) -> PageStructureMetrics {
    let level_count = |level: u8| doc.headings.iter().filter(|h| h.level == level).count();

    PageStructureMetrics {
        url: doc.url.clone(),
        domain: domain_of(&doc.url),
        title_length: doc.title.chars().count(),
        description_length: doc.description.as_deref().map_or(0, |d| d.chars().count()),
        h1_count: doc.h1s.len(),
        h2_count: level_count(2),
        h3_count: level_count(3),
        word_count: doc.word_count,
        keyword_in_title: !term.is_empty() && doc.title.contains(term),
        keyword_in_h1: !term.is_empty() && doc.h1s.join(" ").contains(term),
        keyword_term_freq: occurrences(&doc.main_text, term),
    }
}

/// Metrics for at most `limit` documents of one term, in input order.
pub fn aggregate(term: &str, documents: &[DocumentStructure], limit: usize) -> TopicAnalysis {
    TopicAnalysis {
        term: term.to_string(),
        pages: documents
            .iter()
            .take(limit)
            .map(|doc| page_metrics(term, doc))
            .collect(),
    }
}

/// Aggregate the top `max_terms` distinct plan terms that have documents.
pub fn analyze_plan(
    plan: &CandidatePlan,
    documents: &BTreeMap<String, Vec<DocumentStructure>>,
    max_terms: usize,
    limit: usize,
) -> BTreeMap<String, TopicAnalysis> {
    plan.distinct_top_terms(max_terms)
        .into_iter()
        .filter_map(|candidate| {
            let docs = documents.get(&candidate.term).filter(|d| !d.is_empty())?;
            Some((candidate.term.clone(), aggregate(&candidate.term, docs, limit)))
        })
        .collect()
}

/// Host part of a URL; empty when the URL does not parse.
fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Non-overlapping occurrences of `needle`. An empty needle never matches.
fn occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        0
    } else {
        haystack.matches(needle).count()
    }
}
