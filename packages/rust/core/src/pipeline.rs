//! End-to-end research run: topic → plan → sources → documents → analysis → strategy.
//!
//! Stages run strictly in order. A stage whose input is missing is logged as
//! skipped and leaves the state untouched; nothing in a run is fatal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use siteadvisor_crawler::{DocumentFetcher, HttpDocumentRetrieval, public_redirects_only};
use siteadvisor_generation::{ChatCompletionsClient, TextGeneration};
use siteadvisor_retrieval::{RetrievalClient, RetryPolicy};
use siteadvisor_search::SourceLocator;
use siteadvisor_shared::{
    AppConfig, CandidatePlan, DocumentStructure, LimitsConfig, ProgressEntry, ResearchReport,
    Result, SourceReference, Stage,
};

use crate::analyzer;
use crate::planner::CandidateGenerator;
use crate::state::PipelineState;
use crate::strategist::StrategySynthesizer;

/// Observability sink for a run.
pub trait ProgressReporter: Send + Sync {
    /// Called for every progress-log line, in log order.
    fn entry(&self, entry: &ProgressEntry);
    /// Called as each source document is structured during FETCH.
    fn document_fetched(&self, url: &str, current: usize, total: usize);
    /// Called once when the run completes.
    fn done(&self, report: &ResearchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn entry(&self, _entry: &ProgressEntry) {}
    fn document_fetched(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &ResearchReport) {}
}

/// The research pipeline. Holds no per-run state; `run` may be called
/// repeatedly and concurrently.
#[derive(Clone)]
pub struct Pipeline {
    planner: CandidateGenerator,
    locator: SourceLocator,
    fetcher: DocumentFetcher,
    strategist: StrategySynthesizer,
    limits: LimitsConfig,
}

impl Pipeline {
    pub fn new(
        planner: CandidateGenerator,
        locator: SourceLocator,
        fetcher: DocumentFetcher,
        strategist: StrategySynthesizer,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            planner,
            locator,
            fetcher,
            strategist,
            limits,
        }
    }

    /// Wire every component from config, reading credentials from the env.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let policy = RetryPolicy::from(&config.retry);
        let timeout = Duration::from_secs(config.fetch.timeout_secs);
        let client = RetrievalClient::new(policy, timeout)?;
        // Document fetches follow redirects only to public hosts.
        let fetch_client = if config.fetch.allow_private_hosts {
            client.clone()
        } else {
            RetrievalClient::with_redirect_policy(policy, timeout, public_redirects_only())?
        };

        let generator = ChatCompletionsClient::from_config(&config.generation)?
            .map(|c| Arc::new(c) as Arc<dyn TextGeneration>);
        if generator.is_none() {
            info!(
                key_env = %config.generation.api_key_env,
                "generation credentials not set, using rule-based planning and strategy"
            );
        }

        let locator = SourceLocator::from_config(&config.search, client);
        let fetcher = DocumentFetcher::new(Arc::new(HttpDocumentRetrieval::new(fetch_client)))
            .allow_private_hosts(config.fetch.allow_private_hosts);

        Ok(Self::new(
            CandidateGenerator::from_config(&config.generation, generator.clone()),
            locator,
            fetcher,
            StrategySynthesizer::from_config(&config.generation, generator),
            config.limits.clone(),
        ))
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Run only the planning stage and return the plan.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn plan_only(&self, topic: &str, profile: Option<&Value>) -> CandidatePlan {
        let plan = self.planner.generate(topic, profile).await;
        info!(terms = plan.len(), "plan ready");
        plan
    }

    /// Run every stage for `topic`. Always returns a complete report.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn run(
        &self,
        topic: &str,
        profile: Option<&Value>,
        progress: &dyn ProgressReporter,
    ) -> ResearchReport {
        let mut state = PipelineState::new(topic, profile.cloned());
        let deadline = self
            .limits
            .run_deadline_secs
            .map(|secs| state.started() + Duration::from_secs(secs));

        info!(run_id = %state.run_id, "starting research run");

        self.plan(&mut state, progress).await;

        for stage in [Stage::Locate, Stage::Fetch, Stage::Analyze, Stage::Strategize] {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log(&mut state, progress, stage, "skipped: run deadline exceeded");
                continue;
            }
            match stage {
                Stage::Locate => self.locate(&mut state, progress).await,
                Stage::Fetch => self.fetch(&mut state, progress).await,
                Stage::Analyze => self.analyze(&mut state, progress),
                Stage::Strategize => self.strategize(&mut state, progress).await,
                Stage::Plan | Stage::Done => {}
            }
        }

        log(&mut state, progress, Stage::Done, "run complete");

        let report = state.into_report();
        info!(
            run_id = %report.run_id,
            sources = report.sources.values().map(Vec::len).sum::<usize>(),
            documents = report.documents.values().map(Vec::len).sum::<usize>(),
            analyzed_terms = report.analysis.len(),
            elapsed_ms = report.elapsed_ms,
            "research run complete"
        );
        progress.done(&report);
        report
    }

    async fn plan(&self, state: &mut PipelineState, progress: &dyn ProgressReporter) {
        log(state, progress, Stage::Plan, "start");
        let plan = self
            .planner
            .generate(&state.topic, state.profile.as_ref())
            .await;
        log(
            state,
            progress,
            Stage::Plan,
            format!("done: {} candidate terms", plan.len()),
        );
        state.plan = Some(plan);
    }

    async fn locate(&self, state: &mut PipelineState, progress: &dyn ProgressReporter) {
        log(state, progress, Stage::Locate, "start");
        let Some(terms) = state
            .plan
            .as_ref()
            .map(|plan| selected_terms(plan, self.limits.max_terms))
        else {
            log(state, progress, Stage::Locate, "skipped: no plan");
            return;
        };

        let limit = self.limits.max_sources_per_term;
        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency.max(1)));
        let mut handles = Vec::with_capacity(terms.len());

        for term in terms {
            let sem = Arc::clone(&semaphore);
            let locator = self.locator.clone();
            let query = term.clone();
            handles.push((
                term,
                tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore closed");
                    locator.locate(&query, limit).await
                }),
            ));
        }

        let mut sources = BTreeMap::new();
        for (term, handle) in handles {
            let mut refs = match handle.await {
                Ok(refs) => refs,
                Err(e) => {
                    warn!(term = %term, error = %e, "source lookup task failed");
                    Vec::new()
                }
            };
            refs.truncate(limit);
            info!(term = %term, results = refs.len(), "sources located");
            sources.insert(term, refs);
        }

        let total: usize = sources.values().map(Vec::len).sum();
        let terms = sources.len();
        state.sources = Some(sources);
        log(
            state,
            progress,
            Stage::Locate,
            format!("done: {total} sources for {terms} terms"),
        );
    }

    async fn fetch(&self, state: &mut PipelineState, progress: &dyn ProgressReporter) {
        log(state, progress, Stage::Fetch, "start");
        if !state.has_sources() {
            log(state, progress, Stage::Fetch, "skipped: no sources");
            return;
        }

        let per_term = self.limits.max_sources_per_term;
        let jobs: Vec<(String, SourceReference)> = state
            .sources
            .iter()
            .flatten()
            .flat_map(|(term, refs)| {
                refs.iter()
                    .take(per_term)
                    .map(move |r| (term.clone(), r.clone()))
            })
            .collect();

        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.limits.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);

        for (term, reference) in jobs {
            let sem = Arc::clone(&semaphore);
            let fetcher = self.fetcher.clone();
            let source = reference.clone();
            handles.push((
                term,
                reference,
                tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore closed");
                    fetcher.fetch_and_structure(&source).await
                }),
            ));
        }

        let mut documents: BTreeMap<String, Vec<DocumentStructure>> = BTreeMap::new();
        for (i, (term, reference, handle)) in handles.into_iter().enumerate() {
            let doc = match handle.await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(url = %reference.url, error = %e, "fetch task failed");
                    DocumentStructure::degenerate(&reference)
                }
            };
            progress.document_fetched(&doc.url, i + 1, total);
            documents.entry(term).or_default().push(doc);
        }

        for docs in documents.values_mut() {
            docs.truncate(self.limits.max_pages_per_term);
        }
        let kept: usize = documents.values().map(Vec::len).sum();
        let degenerate = documents
            .values()
            .flatten()
            .filter(|doc| doc.degenerate)
            .count();

        state.documents = Some(documents);
        log(
            state,
            progress,
            Stage::Fetch,
            format!("done: {kept} documents ({degenerate} degenerate)"),
        );
    }

    fn analyze(&self, state: &mut PipelineState, progress: &dyn ProgressReporter) {
        log(state, progress, Stage::Analyze, "start");
        if state.plan.is_none() {
            log(state, progress, Stage::Analyze, "skipped: no plan");
            return;
        }
        if !state.has_documents() {
            log(state, progress, Stage::Analyze, "skipped: no documents");
            return;
        }

        let analysis = match (&state.plan, &state.documents) {
            (Some(plan), Some(documents)) => analyzer::analyze_plan(
                plan,
                documents,
                self.limits.max_terms,
                self.limits.max_pages_per_term,
            ),
            _ => BTreeMap::new(),
        };

        let pages: usize = analysis.values().map(|a| a.pages.len()).sum();
        let terms = analysis.len();
        state.analysis = Some(analysis);
        log(
            state,
            progress,
            Stage::Analyze,
            format!("done: {pages} pages across {terms} terms"),
        );
    }

    async fn strategize(&self, state: &mut PipelineState, progress: &dyn ProgressReporter) {
        log(state, progress, Stage::Strategize, "start");

        let empty = BTreeMap::new();
        let strategy = self
            .strategist
            .synthesize(
                &state.topic,
                state.plan.as_ref(),
                state.analysis.as_ref().unwrap_or(&empty),
                state.profile.as_ref(),
            )
            .await;

        let count = strategy.term_strategies.len();
        state.strategy = Some(strategy);
        log(
            state,
            progress,
            Stage::Strategize,
            format!("done: {count} term strategies"),
        );
    }
}

fn selected_terms(plan: &CandidatePlan, max_terms: usize) -> Vec<String> {
    plan.distinct_top_terms(max_terms)
        .into_iter()
        .map(|t| t.term.clone())
        .collect()
}

/// Append a progress line and mirror it to tracing and the reporter.
fn log(
    state: &mut PipelineState,
    progress: &dyn ProgressReporter,
    stage: Stage,
    message: impl Into<String>,
) {
    let entry = state.record(stage, message);
    info!(stage = %entry.stage, "{}", entry.message);
    progress.entry(entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use siteadvisor_crawler::DocumentRetrieval;
    use siteadvisor_generation::GenerationRequest;
    use siteadvisor_search::{GoogleCustomSearch, RankedSearch, SearchHit};
    use siteadvisor_shared::SiteAdvisorError;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Fails every retrieval.
    struct Offline;

    #[async_trait]
    impl DocumentRetrieval for Offline {
        async fn retrieve(&self, url: &Url) -> Result<String> {
            Err(SiteAdvisorError::Network(format!("{url}: offline")))
        }
    }

    /// Hits derived from the query; later terms answer faster.
    struct SlugSearch;

    #[async_trait]
    impl RankedSearch for SlugSearch {
        async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
            let slug = query.replace(' ', "-");
            let delay = 30u64.saturating_sub(query.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok((0..count + 2)
                .map(|i| SearchHit {
                    title: format!("{query} {i}"),
                    url: format!("https://{slug}.example.com/{i}"),
                    snippet: Some(format!("about {query}")),
                })
                .collect())
        }

        fn name(&self) -> &str {
            "slug"
        }
    }

    /// Serves a page whose title is its own URL.
    struct EchoRetrieval;

    #[async_trait]
    impl DocumentRetrieval for EchoRetrieval {
        async fn retrieve(&self, url: &Url) -> Result<String> {
            Ok(format!(
                "<html><head><title>{url}</title></head><body><h1>{}</h1><h2>a</h2><h2>b</h2></body></html>",
                url.path()
            ))
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        lines: Mutex<Vec<String>>,
        fetched: Mutex<usize>,
        done: Mutex<usize>,
    }

    impl ProgressReporter for RecordingProgress {
        fn entry(&self, entry: &ProgressEntry) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("{} {}", entry.stage, entry.message));
        }

        fn document_fetched(&self, _url: &str, _current: usize, _total: usize) {
            *self.fetched.lock().unwrap() += 1;
        }

        fn done(&self, _report: &ResearchReport) {
            *self.done.lock().unwrap() += 1;
        }
    }

    fn offline_pipeline(limits: LimitsConfig) -> Pipeline {
        Pipeline::new(
            CandidateGenerator::new(None),
            SourceLocator::new(None),
            DocumentFetcher::new(Arc::new(Offline)),
            StrategySynthesizer::new(None),
            limits,
        )
    }

    fn messages(report: &ResearchReport, stage: Stage) -> Vec<&str> {
        report
            .progress
            .iter()
            .filter(|e| e.stage == stage)
            .map(|e| e.message.as_str())
            .collect()
    }

    #[tokio::test]
    async fn offline_run_still_recommends() {
        let report = offline_pipeline(LimitsConfig::default())
            .run("bearing", None, &SilentProgress)
            .await;

        assert!(report.plan.as_ref().is_some_and(|p| p.find("bearing").is_some()));
        assert_eq!(report.sources.len(), 2);
        assert!(report.sources.values().all(Vec::is_empty));
        assert!(report.documents.is_empty());
        assert!(report.analysis.is_empty());
        assert!(!report.strategy.overview.is_empty());
        assert!(!report.strategy.global_recommendations.is_empty());

        assert_eq!(messages(&report, Stage::Fetch), vec!["start", "skipped: no sources"]);
        assert_eq!(messages(&report, Stage::Analyze), vec!["start", "skipped: no documents"]);
    }

    #[tokio::test]
    async fn plan_only_returns_the_planner_output() {
        let plan = offline_pipeline(LimitsConfig::default())
            .plan_only("bearing", None)
            .await;

        assert_eq!(plan, crate::planner::deterministic_plan("bearing"));
    }

    #[tokio::test]
    async fn every_stage_logs_start_and_outcome_in_order() {
        let progress = RecordingProgress::default();
        let report = offline_pipeline(LimitsConfig::default())
            .run("valve", None, &progress)
            .await;

        let stages: Vec<Stage> = report.progress.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Plan,
                Stage::Plan,
                Stage::Locate,
                Stage::Locate,
                Stage::Fetch,
                Stage::Fetch,
                Stage::Analyze,
                Stage::Analyze,
                Stage::Strategize,
                Stage::Strategize,
                Stage::Done,
            ]
        );
        assert!(report.progress.windows(2).all(|w| w[0].at <= w[1].at));

        let lines = progress.lines.lock().unwrap();
        assert_eq!(lines.len(), report.progress.len());
        assert_eq!(lines[0], "PLAN start");
        assert_eq!(*progress.done.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_deadline_skips_everything_after_plan() {
        let limits = LimitsConfig {
            run_deadline_secs: Some(0),
            ..LimitsConfig::default()
        };
        let report = offline_pipeline(limits).run("gear", None, &SilentProgress).await;

        assert!(report.plan.is_some());
        for stage in [Stage::Locate, Stage::Fetch, Stage::Analyze, Stage::Strategize] {
            assert_eq!(messages(&report, stage), vec!["skipped: run deadline exceeded"]);
        }
        assert!(report.sources.is_empty());
        assert!(!report.strategy.overview.is_empty());
        assert!(!report.strategy.global_recommendations.is_empty());
    }

    #[tokio::test]
    async fn concurrent_stages_keep_results_under_their_terms() {
        let limits = LimitsConfig {
            max_terms: 3,
            max_sources_per_term: 2,
            max_pages_per_term: 5,
            concurrency: 4,
            run_deadline_secs: None,
        };
        let pipeline = Pipeline::new(
            CandidateGenerator::new(None),
            SourceLocator::new(Some(Arc::new(SlugSearch))),
            DocumentFetcher::new(Arc::new(EchoRetrieval)),
            StrategySynthesizer::new(None),
            limits,
        );
        let progress = RecordingProgress::default();

        let report = pipeline.run("gear", None, &progress).await;

        let expected = ["gear", "gear definition", "gear types"];
        assert_eq!(report.sources.keys().collect::<Vec<_>>(), expected);

        for term in expected {
            let slug = term.replace(' ', "-");
            let refs = &report.sources[term];
            assert_eq!(refs.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2]);
            assert!(refs.iter().all(|r| r.url.contains(&slug)));

            let docs = &report.documents[term];
            assert_eq!(docs.len(), 2);
            for (doc, reference) in docs.iter().zip(refs) {
                assert_eq!(doc.url, reference.url);
                assert_eq!(doc.title, reference.url);
                assert!(!doc.degenerate);
            }
        }

        assert_eq!(*progress.fetched.lock().unwrap(), 6);
        // Analysis only covers the top `max_terms` terms.
        assert_eq!(report.analysis.len(), 3);
        assert!(report.analysis["gear"].pages.iter().all(|p| p.h2_count == 2));
    }

    #[tokio::test]
    async fn fetch_log_counts_documents_kept_after_page_ceiling() {
        let limits = LimitsConfig {
            max_terms: 2,
            max_sources_per_term: 3,
            max_pages_per_term: 1,
            concurrency: 2,
            run_deadline_secs: None,
        };
        let pipeline = Pipeline::new(
            CandidateGenerator::new(None),
            SourceLocator::new(Some(Arc::new(SlugSearch))),
            DocumentFetcher::new(Arc::new(EchoRetrieval)),
            StrategySynthesizer::new(None),
            limits,
        );

        let report = pipeline.run("gear", None, &SilentProgress).await;

        assert!(report.sources.values().all(|refs| refs.len() == 3));
        assert!(report.documents.values().all(|docs| docs.len() == 1));
        assert_eq!(
            messages(&report, Stage::Fetch),
            vec!["start", "done: 2 documents (0 degenerate)"]
        );
    }

    /// Plan generator whose answer repeats the seed term.
    struct RepeatingPlanner;

    #[async_trait]
    impl TextGeneration for RepeatingPlanner {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            Ok(r#"{"items": [
                {"term": "pump", "intent": "KNOW", "priority": 5},
                {"term": "pump", "intent": "KNOW", "priority": 5},
                {"term": "pump price", "intent": "BUY", "priority": 4}
            ]}"#
            .to_string())
        }

        fn name(&self) -> &str {
            "repeating"
        }
    }

    #[tokio::test]
    async fn repeated_plan_terms_are_analyzed_like_they_are_located() {
        let pipeline = Pipeline::new(
            CandidateGenerator::new(Some(Arc::new(RepeatingPlanner))),
            SourceLocator::new(Some(Arc::new(SlugSearch))),
            DocumentFetcher::new(Arc::new(EchoRetrieval)),
            StrategySynthesizer::new(None),
            LimitsConfig::default(),
        );

        let report = pipeline.run("pump", None, &SilentProgress).await;

        let plan_terms: Vec<&str> = report
            .plan
            .as_ref()
            .map(|p| p.terms.iter().map(|t| t.term.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(plan_terms, vec!["pump", "pump price"]);

        let located: Vec<&String> = report.sources.keys().collect();
        let fetched: Vec<&String> = report.documents.keys().collect();
        let analyzed: Vec<&String> = report.analysis.keys().collect();
        assert_eq!(located, ["pump", "pump price"]);
        assert_eq!(fetched, located);
        assert_eq!(analyzed, fetched);
    }

    #[tokio::test]
    async fn end_to_end_against_mock_services() {
        let server = MockServer::start().await;
        let page_url = format!("{}/guide", server.uri());

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "bearing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"title": "Bearing guide", "link": page_url, "snippet": "bearing basics"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items": []}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/guide"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><head><title>bearing guide</title></head>\
                 <body><h1>What is a bearing</h1><h2>Types</h2><h3>Ball</h3>\
                 <p>A bearing carries load. Every bearing has races.</p></body></html>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetrievalClient::new(RetryPolicy::no_retry(), Duration::from_secs(5)).unwrap();
        let search = GoogleCustomSearch::new(
            client.clone(),
            format!("{}/search", server.uri()),
            "key",
            "cx",
            "en",
        );
        let pipeline = Pipeline::new(
            CandidateGenerator::new(None),
            SourceLocator::new(Some(Arc::new(search))),
            DocumentFetcher::new(Arc::new(HttpDocumentRetrieval::new(client)))
                .allow_private_hosts(true),
            StrategySynthesizer::new(None),
            LimitsConfig::default(),
        );

        let report = pipeline.run("bearing", None, &SilentProgress).await;

        assert_eq!(report.sources["bearing"].len(), 1);
        assert!(report.sources["bearing definition"].is_empty());

        let analysis = &report.analysis["bearing"];
        assert_eq!(analysis.pages.len(), 1);
        let page = &analysis.pages[0];
        assert!(page.keyword_in_title);
        assert!(page.keyword_in_h1);
        assert_eq!((page.h1_count, page.h2_count, page.h3_count), (1, 1, 1));
        assert!(page.keyword_term_freq >= 3);
        assert!(!report.analysis.contains_key("bearing definition"));
        assert_eq!(report.strategy.term_strategies.len(), 10);
    }
}
