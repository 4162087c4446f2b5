//! Per-run pipeline state.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use siteadvisor_shared::{
    CandidatePlan, DocumentStructure, ProgressEntry, ResearchReport, RunId, SourceReference, Stage,
    StrategyRecommendation, TopicAnalysis,
};

use crate::strategist::minimal_recommendation;

/// Accumulator owned by exactly one in-flight run.
///
/// Each stage output is `None` until the stage that produces it has run, so
/// a skipped stage is visible in the type rather than as a missing key.
#[derive(Debug)]
pub struct PipelineState {
    pub run_id: RunId,
    pub topic: String,
    pub profile: Option<Value>,
    pub stage: Stage,
    pub plan: Option<CandidatePlan>,
    pub sources: Option<BTreeMap<String, Vec<SourceReference>>>,
    pub documents: Option<BTreeMap<String, Vec<DocumentStructure>>>,
    pub analysis: Option<BTreeMap<String, TopicAnalysis>>,
    pub strategy: Option<StrategyRecommendation>,
    pub progress: Vec<ProgressEntry>,
    started: Instant,
}

impl PipelineState {
    pub fn new(topic: impl Into<String>, profile: Option<Value>) -> Self {
        Self {
            run_id: RunId::new(),
            topic: topic.into(),
            profile,
            stage: Stage::Plan,
            plan: None,
            sources: None,
            documents: None,
            analysis: None,
            strategy: None,
            progress: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Move to `stage` and append a timestamped progress line.
    pub fn record(&mut self, stage: Stage, message: impl Into<String>) -> &ProgressEntry {
        self.stage = stage;
        self.progress.push(ProgressEntry {
            at: Utc::now(),
            stage,
            message: message.into(),
        });
        &self.progress[self.progress.len() - 1]
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Whether any term has at least one source.
    pub fn has_sources(&self) -> bool {
        self.sources
            .as_ref()
            .is_some_and(|s| s.values().any(|refs| !refs.is_empty()))
    }

    /// Whether any term has at least one document.
    pub fn has_documents(&self) -> bool {
        self.documents
            .as_ref()
            .is_some_and(|d| d.values().any(|docs| !docs.is_empty()))
    }

    /// Close the run. Missing stage outputs become empty maps and a missing
    /// strategy becomes the minimal recommendation.
    pub fn into_report(self) -> ResearchReport {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let strategy = self
            .strategy
            .unwrap_or_else(|| minimal_recommendation(&self.topic));

        ResearchReport {
            run_id: self.run_id,
            topic: self.topic,
            plan: self.plan,
            sources: self.sources.unwrap_or_default(),
            documents: self.documents.unwrap_or_default(),
            analysis: self.analysis.unwrap_or_default(),
            strategy,
            progress: self.progress,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_updates_stage_marker() {
        let mut state = PipelineState::new("valve", None);
        assert_eq!(state.stage, Stage::Plan);

        let entry = state.record(Stage::Locate, "start").clone();
        assert_eq!(entry.stage, Stage::Locate);
        assert_eq!(entry.message, "start");
        assert_eq!(state.stage, Stage::Locate);
        assert_eq!(state.progress.len(), 1);
    }

    #[test]
    fn precondition_helpers_look_inside_maps() {
        let mut state = PipelineState::new("valve", None);
        assert!(!state.has_sources());

        state.sources = Some(BTreeMap::from([("valve".to_string(), Vec::new())]));
        assert!(!state.has_sources());

        state.documents = Some(BTreeMap::new());
        assert!(!state.has_documents());
    }

    #[test]
    fn empty_state_still_produces_complete_report() {
        let report = PipelineState::new("valve", None).into_report();

        assert_eq!(report.topic, "valve");
        assert!(report.plan.is_none());
        assert!(report.sources.is_empty());
        assert!(report.analysis.is_empty());
        assert!(!report.strategy.overview.is_empty());
        assert!(!report.strategy.global_recommendations.is_empty());
    }
}
