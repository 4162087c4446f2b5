//! Core domain types for SiteAdvisor research runs.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::text::{term_frequencies, tokenize};

/// Lowest priority a candidate term can carry.
pub const MIN_PRIORITY: u8 = 1;
/// Highest priority a candidate term can carry.
pub const MAX_PRIORITY: u8 = 5;
/// Priority used when an upstream value is missing or unreadable.
pub const DEFAULT_PRIORITY: u8 = 3;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for research run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Candidate terms
// ---------------------------------------------------------------------------

/// Search intent behind a candidate term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Know,
    Compare,
    Buy,
    Navigational,
}

impl Intent {
    /// All intents in report order.
    pub const ALL: [Intent; 4] = [Self::Know, Self::Compare, Self::Buy, Self::Navigational];

    /// Canonical upper-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Know => "KNOW",
            Self::Compare => "COMPARE",
            Self::Buy => "BUY",
            Self::Navigational => "NAVIGATIONAL",
        }
    }

    /// Map a free-form label onto an intent. Unknown or missing labels are `Know`.
    pub fn canonicalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Know;
        };
        let label = raw.trim().to_uppercase();

        if let Some(exact) = Self::ALL.into_iter().find(|i| i.as_str() == label) {
            return exact;
        }

        if label.contains("NAV") {
            Self::Navigational
        } else if label.contains("COMP") {
            Self::Compare
        } else if label.contains("BUY") || label.contains("PURCHASE") || label.contains("CV") {
            Self::Buy
        } else {
            Self::Know
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp an integer priority into `[MIN_PRIORITY, MAX_PRIORITY]`.
pub fn clamp_priority(value: i64) -> u8 {
    value.clamp(i64::from(MIN_PRIORITY), i64::from(MAX_PRIORITY)) as u8
}

/// Normalize an untrusted priority value.
///
/// Null and non-numeric values map to [`DEFAULT_PRIORITY`]; floats are
/// truncated; numeric strings are parsed. The result is always clamped.
pub fn normalize_priority(value: &serde_json::Value) -> u8 {
    use serde_json::Value;

    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    raw.map_or(DEFAULT_PRIORITY, clamp_priority)
}

fn deserialize_priority<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(normalize_priority(&value))
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// A generated topic variant with intent and priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTerm {
    /// The search term itself.
    pub term: String,
    /// Search intent.
    pub intent: Intent,
    /// Free-form grouping label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Importance in `[1, 5]`, higher first.
    #[serde(default = "default_priority", deserialize_with = "deserialize_priority")]
    pub priority: u8,
    /// Why this term is worth targeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl CandidateTerm {
    /// Create a term, clamping the priority into range.
    pub fn new(term: impl Into<String>, intent: Intent, priority: i64) -> Self {
        Self {
            term: term.into(),
            intent,
            category: None,
            priority: clamp_priority(priority),
            rationale: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// The ordered list of candidate terms for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePlan {
    /// Seed topic the plan was generated for.
    pub topic: String,
    /// Terms in insertion order.
    pub terms: Vec<CandidateTerm>,
}

impl CandidatePlan {
    pub fn new(topic: impl Into<String>, terms: Vec<CandidateTerm>) -> Self {
        Self {
            topic: topic.into(),
            terms,
        }
    }

    /// Top `n` terms by priority; ties keep insertion order.
    pub fn top_terms(&self, n: usize) -> Vec<&CandidateTerm> {
        let mut sorted: Vec<&CandidateTerm> = self.terms.iter().collect();
        // `sort_by` is stable, which is what keeps ties in plan order.
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted.truncate(n);
        sorted
    }

    /// Top `n` distinct terms by priority; the first occurrence of a repeated
    /// term wins. This is the selection every stage after PLAN works on.
    pub fn distinct_top_terms(&self, n: usize) -> Vec<&CandidateTerm> {
        let mut selected: Vec<&CandidateTerm> = Vec::new();
        for candidate in self.top_terms(self.terms.len()) {
            if selected.len() == n {
                break;
            }
            if !selected.iter().any(|t| t.term == candidate.term) {
                selected.push(candidate);
            }
        }
        selected
    }

    /// Highest priority present in the plan.
    pub fn max_priority(&self) -> Option<u8> {
        self.terms.iter().map(|t| t.priority).max()
    }

    /// Look up a term by its text.
    pub fn find(&self, term: &str) -> Option<&CandidateTerm> {
        self.terms.iter().find(|t| t.term == term)
    }

    /// Terms grouped by intent. Every intent is present, possibly empty.
    pub fn group_by_intent(&self) -> BTreeMap<Intent, Vec<&CandidateTerm>> {
        let mut groups: BTreeMap<Intent, Vec<&CandidateTerm>> =
            Intent::ALL.into_iter().map(|i| (i, Vec::new())).collect();
        for term in &self.terms {
            groups.entry(term.intent).or_default().push(term);
        }
        groups
    }

    /// Terms grouped by category. Uncategorized terms are left out.
    pub fn group_by_category(&self) -> HashMap<&str, Vec<&CandidateTerm>> {
        let mut groups: HashMap<&str, Vec<&CandidateTerm>> = HashMap::new();
        for term in &self.terms {
            if let Some(category) = term.category.as_deref() {
                groups.entry(category).or_default().push(term);
            }
        }
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }
}

// ---------------------------------------------------------------------------
// Sources and documents
// ---------------------------------------------------------------------------

/// A ranked external pointer returned by search, before any fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    /// 1-based rank, unique within one term's list.
    pub rank: u32,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// One entry of the flat heading list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// Heading level, 1 through 6.
    pub level: u8,
    pub text: String,
}

/// A heading with its nested sub-headings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingNode {
    pub level: u8,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HeadingNode>,
}

impl HeadingNode {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(HeadingNode::subtree_len).sum::<usize>()
    }
}

/// Structural representation of a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStructure {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Text of every `h1`, in document order.
    pub h1s: Vec<String>,
    /// Every heading in document order.
    pub headings: Vec<Heading>,
    /// Hierarchical reconstruction of `headings`.
    pub heading_tree: Vec<HeadingNode>,
    pub main_text: String,
    /// Always equals the token count of `main_text`.
    pub word_count: usize,
    pub term_freq: BTreeMap<String, usize>,
    /// SHA-256 of the raw markup, when the page was actually fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Built from a source reference alone, without network access.
    #[serde(default)]
    pub degenerate: bool,
}

impl DocumentStructure {
    /// Minimal structure built from a reference's title and snippet.
    pub fn degenerate(reference: &SourceReference) -> Self {
        let main_text = reference.snippet.clone().unwrap_or_default();
        let tokens = tokenize(&main_text);
        let word_count = tokens.len();
        let term_freq = term_frequencies(&tokens);

        Self {
            url: reference.url.clone(),
            title: reference.title.clone(),
            description: reference.snippet.clone(),
            h1s: Vec::new(),
            headings: Vec::new(),
            heading_tree: Vec::new(),
            main_text,
            word_count,
            term_freq,
            content_hash: None,
            degenerate: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Structural metrics of one document relative to one candidate term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStructureMetrics {
    pub url: String,
    pub domain: String,
    pub title_length: usize,
    pub description_length: usize,
    pub h1_count: usize,
    pub h2_count: usize,
    pub h3_count: usize,
    pub word_count: usize,
    pub keyword_in_title: bool,
    pub keyword_in_h1: bool,
    pub keyword_term_freq: usize,
}

/// Per-term structural analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAnalysis {
    pub term: String,
    pub pages: Vec<PageStructureMetrics>,
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Recommendation for a single candidate term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermStrategy {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Page type to build for this term (category page, FAQ, column...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Final recommendation for a research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub topic: String,
    pub overview: String,
    pub global_recommendations: Vec<String>,
    pub term_strategies: Vec<TermStrategy>,
}

// ---------------------------------------------------------------------------
// Run progress and result bundle
// ---------------------------------------------------------------------------

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Plan,
    Locate,
    Fetch,
    Analyze,
    Strategize,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "PLAN",
            Self::Locate => "LOCATE",
            Self::Fetch => "FETCH",
            Self::Analyze => "ANALYZE",
            Self::Strategize => "STRATEGIZE",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the per-run progress log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    pub message: String,
}

impl std::fmt::Display for ProgressEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] [{}] {}", self.at.to_rfc3339(), self.stage, self.message)
    }
}

/// Everything a run produces. Absent data shows up as empty maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub run_id: RunId,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<CandidatePlan>,
    pub sources: BTreeMap<String, Vec<SourceReference>>,
    pub documents: BTreeMap<String, Vec<DocumentStructure>>,
    pub analysis: BTreeMap<String, TopicAnalysis>,
    pub strategy: StrategyRecommendation,
    pub progress: Vec<ProgressEntry>,
    pub elapsed_ms: u64,
}
