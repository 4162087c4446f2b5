//! Prompt templates and output schemas for the two generative stages.
//!
//! Templates only assemble text; answer parsing and validation live with the
//! components that consume the answers.

use serde_json::{Value, json};

use crate::GenerationRequest;

const PLANNER_SYSTEM: &str = "You are a search strategist for B2B industrial e-commerce. \
Given a seed topic, propose related search terms a buyer or engineer would type. \
Cover learning, comparison, purchase and navigational intents. \
Use intent labels KNOW, COMPARE, BUY or NAVIGATIONAL and priorities from 1 (low) to 5 (high).";

const STRATEGIST_SYSTEM: &str = "You are a content strategist for B2B industrial e-commerce. \
From a candidate term plan and aggregated structural metrics of ranking pages, \
recommend which pages to build and how to structure them. \
Base every recommendation on the metrics given; do not invent data.";

/// Schema of the planner answer: `{"items": [{term, intent, category, priority, rationale}]}`.
pub fn candidate_plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "term": {"type": "string"},
                        "intent": {"type": "string", "enum": ["KNOW", "COMPARE", "BUY", "NAVIGATIONAL"]},
                        "category": {"type": "string"},
                        "priority": {"type": "integer", "minimum": 1, "maximum": 5},
                        "rationale": {"type": "string"}
                    },
                    "required": ["term", "intent", "priority"]
                }
            }
        },
        "required": ["items"]
    })
}

/// Schema of the strategist answer.
pub fn strategy_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "overview": {"type": "string"},
            "global_recommendations": {"type": "array", "items": {"type": "string"}},
            "term_strategies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "term": {"type": "string"},
                        "intent": {"type": "string"},
                        "priority": {"type": "integer"},
                        "content_type": {"type": "string"},
                        "actions": {"type": "array", "items": {"type": "string"}},
                        "notes": {"type": "string"}
                    },
                    "required": ["term", "actions"]
                }
            }
        },
        "required": ["overview", "global_recommendations", "term_strategies"]
    })
}

/// Request for the candidate-term planner.
pub fn candidate_plan_request(
    topic: &str,
    profile: Option<&Value>,
    max_candidates: usize,
) -> GenerationRequest {
    let mut user = format!("Seed topic: {topic}\nPropose at most {max_candidates} terms.");
    if let Some(profile) = profile {
        user.push_str(&format!("\nSite profile (JSON): {profile}"));
    }

    GenerationRequest::new(PLANNER_SYSTEM, user)
        .with_schema(candidate_plan_schema())
        .with_temperature(0.4)
}

/// Request for the strategy synthesizer.
///
/// `plan` and `analysis` are passed as already-compacted JSON; raw page text
/// never reaches the prompt.
pub fn strategy_request(
    topic: &str,
    plan: &Value,
    analysis: &Value,
    profile: Option<&Value>,
) -> GenerationRequest {
    let mut user = format!(
        "Seed topic: {topic}\n\nCandidate plan (JSON):\n{plan}\n\nStructural metrics per term (JSON):\n{analysis}"
    );
    if let Some(profile) = profile {
        user.push_str(&format!("\n\nSite profile (JSON):\n{profile}"));
    }

    GenerationRequest::new(STRATEGIST_SYSTEM, user)
        .with_schema(strategy_schema())
        .with_temperature(0.3)
}
