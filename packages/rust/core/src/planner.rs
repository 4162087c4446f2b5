//! Candidate-term planning.
//!
//! [`CandidateGenerator`] asks the text-generation capability for a plan when
//! one is configured and falls back to a fixed, topic-derived catalog
//! otherwise. Either way the returned plan contains the topic itself at the
//! maximum priority.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use siteadvisor_generation::{TextGeneration, prompts, strip_code_fence};
use siteadvisor_shared::{
    CandidatePlan, CandidateTerm, GenerationConfig, Intent, MAX_PRIORITY, Result,
    SiteAdvisorError, normalize_priority,
};

/// Planner answer: either `{"items": [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlan {
    Wrapped { items: Vec<RawItem> },
    Bare(Vec<RawItem>),
}

impl RawPlan {
    fn into_items(self) -> Vec<RawItem> {
        match self {
            Self::Wrapped { items } | Self::Bare(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    term: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Value,
    #[serde(default)]
    rationale: Option<String>,
}

/// Produces the candidate-term plan for a topic.
#[derive(Clone)]
pub struct CandidateGenerator {
    generator: Option<Arc<dyn TextGeneration>>,
    max_candidates: usize,
    rationale_max_chars: usize,
}

impl CandidateGenerator {
    /// Generator with default limits. `None` selects the deterministic catalog.
    pub fn new(generator: Option<Arc<dyn TextGeneration>>) -> Self {
        Self::from_config(&GenerationConfig::default(), generator)
    }

    pub fn from_config(
        config: &GenerationConfig,
        generator: Option<Arc<dyn TextGeneration>>,
    ) -> Self {
        Self {
            generator,
            max_candidates: config.max_candidates.max(1),
            rationale_max_chars: config.rationale_max_chars,
        }
    }

    /// Whether plans come from the generative capability.
    pub fn is_generative(&self) -> bool {
        self.generator.is_some()
    }

    /// Build the plan for `topic`. Never fails and never returns an empty plan.
    #[instrument(skip_all, fields(topic = %topic, generative = self.is_generative()))]
    pub async fn generate(&self, topic: &str, profile: Option<&Value>) -> CandidatePlan {
        let Some(generator) = &self.generator else {
            return deterministic_plan(topic);
        };

        match self.generate_with(generator.as_ref(), topic, profile).await {
            Ok(plan) => {
                info!(terms = plan.len(), model = generator.name(), "generated candidate plan");
                plan
            }
            Err(e) => {
                warn!(error = %e, "candidate generation failed, using catalog");
                deterministic_plan(topic)
            }
        }
    }

    async fn generate_with(
        &self,
        generator: &dyn TextGeneration,
        topic: &str,
        profile: Option<&Value>,
    ) -> Result<CandidatePlan> {
        let request = prompts::candidate_plan_request(topic, profile, self.max_candidates);
        let answer = generator.generate(&request).await?;

        let raw: RawPlan = serde_json::from_str(strip_code_fence(&answer))
            .map_err(|e| SiteAdvisorError::parse(format!("candidate plan: {e}")))?;

        let mut terms: Vec<CandidateTerm> = Vec::new();
        for candidate in raw.into_items().into_iter().filter_map(|item| self.normalize(item)) {
            if terms.len() == self.max_candidates {
                break;
            }
            // First occurrence of a repeated term wins.
            if !terms.iter().any(|t| t.term == candidate.term) {
                terms.push(candidate);
            }
        }

        if terms.is_empty() {
            return Err(SiteAdvisorError::Generation("candidate plan has no usable items".into()));
        }
        debug!(raw_terms = terms.len(), "candidate items normalized");

        Ok(self.anchor_topic(topic, terms))
    }

    fn normalize(&self, item: RawItem) -> Option<CandidateTerm> {
        let term = item.term.trim();
        if term.is_empty() {
            return None;
        }

        Some(CandidateTerm {
            term: term.to_string(),
            intent: Intent::canonicalize(item.intent.as_deref()),
            category: non_empty(item.category),
            priority: normalize_priority(&item.priority),
            rationale: non_empty(item.rationale)
                .map(|r| truncate_chars(&r, self.rationale_max_chars)),
        })
    }

    /// Make sure the topic is in the plan at the maximum priority.
    fn anchor_topic(&self, topic: &str, mut terms: Vec<CandidateTerm>) -> CandidatePlan {
        match terms.iter_mut().find(|t| t.term == topic) {
            Some(existing) => existing.priority = MAX_PRIORITY,
            None => {
                terms.truncate(self.max_candidates.saturating_sub(1));
                terms.insert(0, seed_term(topic));
            }
        }
        CandidatePlan::new(topic, terms)
    }
}

fn seed_term(topic: &str) -> CandidateTerm {
    CandidateTerm::new(topic, Intent::Know, i64::from(MAX_PRIORITY))
        .with_category("core")
        .with_rationale("The seed topic itself.")
}

/// Fixed catalog derived from the topic. Reproducible and offline.
pub fn deterministic_plan(topic: &str) -> CandidatePlan {
    // (suffix, intent, priority, category, rationale)
    const CATALOG: &[(&str, Intent, i64, &str, &str)] = &[
        ("definition", Intent::Know, 5, "basics", "Readers looking for what it is."),
        ("types", Intent::Know, 4, "basics", "Overview of variants and classifications."),
        ("comparison", Intent::Compare, 4, "comparison", "Side-by-side evaluation before selection."),
        ("use cases", Intent::Know, 4, "applications", "Concrete applications and examples."),
        ("design", Intent::Know, 3, "technical", "Engineering and design considerations."),
        ("strength calculation", Intent::Know, 3, "technical", "Sizing and load calculations."),
        ("price", Intent::Buy, 3, "purchase", "Cost research close to a purchase decision."),
        ("quotation", Intent::Buy, 3, "purchase", "Requests for quotes and lead times."),
        ("manufacturers", Intent::Navigational, 2, "vendor", "Searches for specific makers and brands."),
    ];

    let mut terms = Vec::with_capacity(CATALOG.len() + 1);
    terms.push(seed_term(topic));
    terms.extend(
        CATALOG
            .iter()
            .map(|&(suffix, intent, priority, category, rationale)| {
                CandidateTerm::new(format!("{topic} {suffix}"), intent, priority)
                    .with_category(category)
                    .with_rationale(rationale)
            }),
    );

    CandidatePlan::new(topic, terms)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use siteadvisor_generation::GenerationRequest;

    /// Returns a canned answer, or an error when `None`.
    struct CannedGeneration(Option<String>);

    #[async_trait]
    impl TextGeneration for CannedGeneration {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            self.0
                .clone()
                .ok_or_else(|| SiteAdvisorError::Network("connection refused".into()))
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn generative(answer: Option<&str>) -> CandidateGenerator {
        CandidateGenerator::new(Some(Arc::new(CannedGeneration(answer.map(str::to_string)))))
    }

    fn assert_anchored(plan: &CandidatePlan, topic: &str) {
        let seed = plan.find(topic).expect("topic present");
        assert_eq!(Some(seed.priority), plan.max_priority());
        assert_eq!(seed.priority, MAX_PRIORITY);
    }

    #[tokio::test]
    async fn deterministic_catalog_contains_topic_at_max_priority() {
        let plan = CandidateGenerator::new(None).generate("bearing", None).await;

        assert_eq!(plan.len(), 10);
        assert_eq!(plan.terms[0].term, "bearing");
        assert_anchored(&plan, "bearing");
        assert!(plan.find("bearing comparison").is_some_and(|t| t.intent == Intent::Compare));
        assert!(plan.find("bearing manufacturers").is_some_and(|t| t.intent == Intent::Navigational));
        assert_eq!(plan, deterministic_plan("bearing"));
    }

    #[tokio::test]
    async fn generative_items_are_normalized() {
        let answer = json!({
            "items": [
                {"term": "bearing", "intent": "KNOW", "priority": 5},
                {"term": " bearing price ", "intent": "purchase", "priority": 9, "category": "buy"},
                {"term": "bearing vs bushing", "intent": "comparison", "priority": "2",
                 "rationale": "x".repeat(500)},
                {"term": "", "intent": "KNOW", "priority": 4},
                {"term": "bearing shops", "intent": "nav query", "priority": null}
            ]
        })
        .to_string();

        let plan = generative(Some(&answer)).generate("bearing", None).await;

        assert_eq!(plan.len(), 4);
        let price = plan.find("bearing price").unwrap();
        assert_eq!((price.intent, price.priority), (Intent::Buy, 5));
        let vs = plan.find("bearing vs bushing").unwrap();
        assert_eq!((vs.intent, vs.priority), (Intent::Compare, 2));
        assert_eq!(vs.rationale.as_ref().unwrap().chars().count(), 200);
        let shops = plan.find("bearing shops").unwrap();
        assert_eq!((shops.intent, shops.priority), (Intent::Navigational, 3));
        assert_anchored(&plan, "bearing");
    }

    #[tokio::test]
    async fn missing_topic_is_prepended() {
        let answer = r#"```json
[{"term": "gear ratio", "intent": "KNOW", "priority": 3}]
```"#;
        let plan = generative(Some(answer)).generate("gear", None).await;

        assert_eq!(plan.terms[0].term, "gear");
        assert_eq!(plan.len(), 2);
        assert_anchored(&plan, "gear");
    }

    #[tokio::test]
    async fn low_priority_topic_is_raised() {
        let answer = r#"{"items": [{"term": "valve", "intent": "KNOW", "priority": 1}]}"#;
        let plan = generative(Some(answer)).generate("valve", None).await;

        assert_eq!(plan.len(), 1);
        assert_anchored(&plan, "valve");
    }

    #[tokio::test]
    async fn repeated_terms_keep_first_occurrence() {
        let answer = json!({
            "items": [
                {"term": "pump", "intent": "KNOW", "priority": 5},
                {"term": "pump price", "intent": "BUY", "priority": 4},
                {"term": "pump", "intent": "COMPARE", "priority": 2},
                {"term": "pump price", "intent": "KNOW", "priority": 1}
            ]
        })
        .to_string();

        let plan = generative(Some(&answer)).generate("pump", None).await;

        let terms: Vec<&str> = plan.terms.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["pump", "pump price"]);
        let price = plan.find("pump price").unwrap();
        assert_eq!((price.intent, price.priority), (Intent::Buy, 4));
        assert_anchored(&plan, "pump");
    }

    #[tokio::test]
    async fn result_count_is_capped() {
        let items: Vec<Value> = (0..30)
            .map(|i| json!({"term": format!("pump {i}"), "intent": "KNOW", "priority": 3}))
            .collect();
        let answer = json!({ "items": items }).to_string();

        let plan = generative(Some(&answer)).generate("pump", None).await;

        assert_eq!(plan.len(), 12);
        assert_anchored(&plan, "pump");
    }

    #[tokio::test]
    async fn failures_fall_back_to_catalog() {
        for answer in [None, Some("not json at all"), Some(r#"{"items": []}"#), Some(r#"{"items": [{"term": "  "}]}"#)] {
            let plan = generative(answer).generate("motor", None).await;
            assert_eq!(plan, deterministic_plan("motor"), "answer {answer:?}");
        }
    }
}
