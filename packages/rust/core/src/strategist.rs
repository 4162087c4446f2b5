//! Strategy synthesis with three degradation tiers.
//!
//! 1. No plan: a minimal generic recommendation.
//! 2. Plan but no generative capability: a deterministic recommendation over
//!    the top terms.
//! 3. Generative capability: a model-written recommendation from the plan and
//!    a compacted analysis, falling back to tier 2 on any failure.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use siteadvisor_generation::{TextGeneration, prompts, strip_code_fence};
use siteadvisor_shared::{
    CandidatePlan, GenerationConfig, Intent, PageStructureMetrics, Result, SiteAdvisorError,
    StrategyRecommendation, TermStrategy, TopicAnalysis, normalize_priority,
};

/// Appended to the overview when the model call failed.
const GENERATION_ERROR_NOTE: &str = " (generation error)";

/// Aggregated per-term metrics sent to the model instead of raw pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub pages: usize,
    pub mean_title_length: f64,
    pub mean_word_count: f64,
    pub mean_h2_count: f64,
    pub mean_h3_count: f64,
    pub keyword_in_title_share: f64,
    pub keyword_in_h1_share: f64,
}

impl AnalysisSummary {
    pub fn from_analysis(analysis: &TopicAnalysis) -> Self {
        let pages = &analysis.pages;
        Self {
            pages: pages.len(),
            mean_title_length: mean(pages, |p| p.title_length as f64),
            mean_word_count: mean(pages, |p| p.word_count as f64),
            mean_h2_count: mean(pages, |p| p.h2_count as f64),
            mean_h3_count: mean(pages, |p| p.h3_count as f64),
            keyword_in_title_share: mean(pages, |p| f64::from(u8::from(p.keyword_in_title))),
            keyword_in_h1_share: mean(pages, |p| f64::from(u8::from(p.keyword_in_h1))),
        }
    }
}

fn mean(pages: &[PageStructureMetrics], f: impl Fn(&PageStructureMetrics) -> f64) -> f64 {
    if pages.is_empty() {
        return 0.0;
    }
    pages.iter().map(f).sum::<f64>() / pages.len() as f64
}

/// Per-term summaries, keyed by term.
pub fn compact_analysis(
    analysis: &BTreeMap<String, TopicAnalysis>,
) -> BTreeMap<String, AnalysisSummary> {
    analysis
        .iter()
        .map(|(term, a)| (term.clone(), AnalysisSummary::from_analysis(a)))
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    overview: String,
    #[serde(default)]
    global_recommendations: Vec<String>,
    #[serde(default)]
    term_strategies: Vec<RawTermStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawTermStrategy {
    #[serde(default)]
    term: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl RawTermStrategy {
    fn into_strategy(self) -> Option<TermStrategy> {
        let term = self.term.trim().to_string();
        if term.is_empty() {
            return None;
        }
        Some(TermStrategy {
            term,
            intent: self.intent.as_deref().map(|i| Intent::canonicalize(Some(i))),
            priority: self.priority.as_ref().map(normalize_priority),
            content_type: self.content_type.filter(|c| !c.trim().is_empty()),
            actions: self.actions.into_iter().filter(|a| !a.trim().is_empty()).collect(),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
        })
    }
}

/// Produces the final recommendation of a run.
#[derive(Clone)]
pub struct StrategySynthesizer {
    generator: Option<Arc<dyn TextGeneration>>,
    top_terms: usize,
}

impl StrategySynthesizer {
    pub fn new(generator: Option<Arc<dyn TextGeneration>>) -> Self {
        Self::from_config(&GenerationConfig::default(), generator)
    }

    pub fn from_config(
        config: &GenerationConfig,
        generator: Option<Arc<dyn TextGeneration>>,
    ) -> Self {
        Self {
            generator,
            top_terms: config.strategy_top_terms,
        }
    }

    /// Never fails; see the module docs for the tiers.
    #[instrument(skip_all, fields(topic = %topic, has_plan = plan.is_some(), analyzed = analysis.len()))]
    pub async fn synthesize(
        &self,
        topic: &str,
        plan: Option<&CandidatePlan>,
        analysis: &BTreeMap<String, TopicAnalysis>,
        profile: Option<&Value>,
    ) -> StrategyRecommendation {
        let Some(plan) = plan else {
            return minimal_recommendation(topic);
        };

        let Some(generator) = &self.generator else {
            return deterministic_recommendation(topic, plan, self.top_terms);
        };

        match synthesize_with(generator.as_ref(), topic, plan, analysis, profile).await {
            Ok(recommendation) => {
                info!(
                    term_strategies = recommendation.term_strategies.len(),
                    model = generator.name(),
                    "strategy generated"
                );
                recommendation
            }
            Err(e) => {
                warn!(error = %e, "strategy generation failed, using deterministic tier");
                let mut fallback = deterministic_recommendation(topic, plan, self.top_terms);
                fallback.overview.push_str(GENERATION_ERROR_NOTE);
                fallback
            }
        }
    }
}

async fn synthesize_with(
    generator: &dyn TextGeneration,
    topic: &str,
    plan: &CandidatePlan,
    analysis: &BTreeMap<String, TopicAnalysis>,
    profile: Option<&Value>,
) -> Result<StrategyRecommendation> {
    let encode = |e: serde_json::Error| SiteAdvisorError::parse(format!("encode prompt input: {e}"));
    let plan_json = serde_json::to_value(plan).map_err(encode)?;
    let analysis_json = serde_json::to_value(compact_analysis(analysis)).map_err(encode)?;

    let request = prompts::strategy_request(topic, &plan_json, &analysis_json, profile);
    let answer = generator.generate(&request).await?;

    let raw: RawStrategy = serde_json::from_str(strip_code_fence(&answer))
        .map_err(|e| SiteAdvisorError::parse(format!("strategy: {e}")))?;

    if raw.overview.trim().is_empty() {
        return Err(SiteAdvisorError::Generation("strategy has an empty overview".into()));
    }

    Ok(StrategyRecommendation {
        topic: topic.to_string(),
        overview: raw.overview.trim().to_string(),
        global_recommendations: raw
            .global_recommendations
            .into_iter()
            .filter(|r| !r.trim().is_empty())
            .collect(),
        term_strategies: raw
            .term_strategies
            .into_iter()
            .filter_map(RawTermStrategy::into_strategy)
            .collect(),
    })
}

/// Tier 1: recommendation without any plan.
pub fn minimal_recommendation(topic: &str) -> StrategyRecommendation {
    StrategyRecommendation {
        topic: topic.to_string(),
        overview: format!(
            "No candidate plan was available for \"{topic}\", so this is a generic starting point."
        ),
        global_recommendations: vec![
            format!("Publish a foundational guide that explains \"{topic}\" and links to related products."),
            "Structure every page with one h1 containing the target term and descriptive h2 sections."
                .to_string(),
        ],
        term_strategies: Vec::new(),
    }
}

/// Tier 2: recommendation over the top `top_n` plan terms, no model involved.
pub fn deterministic_recommendation(
    topic: &str,
    plan: &CandidatePlan,
    top_n: usize,
) -> StrategyRecommendation {
    let term_strategies: Vec<TermStrategy> = plan
        .top_terms(top_n)
        .into_iter()
        .map(|candidate| TermStrategy {
            term: candidate.term.clone(),
            intent: Some(candidate.intent),
            priority: Some(candidate.priority),
            content_type: Some("to be decided (category page, guide or FAQ)".to_string()),
            actions: vec![
                format!("Create or improve a page that targets \"{}\".", candidate.term),
                "Include the term in the title and h1, and cover subtopics with h2 sections."
                    .to_string(),
            ],
            notes: Some("Rule-based recommendation; refine with search data.".to_string()),
        })
        .collect();

    StrategyRecommendation {
        topic: topic.to_string(),
        overview: format!(
            "Rule-based recommendation for \"{topic}\" covering the top {} candidate terms.",
            term_strategies.len()
        ),
        global_recommendations: vec![
            "Build one hub page for the topic and link every term page from it.".to_string(),
            "Prioritize high-priority terms first and track rankings after publishing.".to_string(),
        ],
        term_strategies,
    }
}
