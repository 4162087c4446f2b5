//! Ranked source lookup per candidate term.
//!
//! [`SourceLocator`] turns a term into an ordered list of
//! [`SourceReference`]s. The actual search engine sits behind the
//! [`RankedSearch`] capability; [`GoogleCustomSearch`] is the shipped backend
//! and talks to the Custom Search JSON API through the shared
//! [`RetrievalClient`](siteadvisor_retrieval::RetrievalClient).
//!
//! Lookup never fails: missing credentials, rate limiting and malformed
//! responses all resolve to an empty list (or placeholder references, when
//! configured).

mod google;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use siteadvisor_retrieval::RetrievalClient;
use siteadvisor_shared::{MissingCredentialsPolicy, Result, SearchConfig, SourceReference};

pub use google::GoogleCustomSearch;

/// One unranked hit from a search backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
}

/// A ranked search engine: query + count → ordered hits.
#[async_trait]
pub trait RankedSearch: Send + Sync {
    /// Run a query and return at most `count` hits, best first.
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>>;

    /// Backend name for tracing.
    fn name(&self) -> &str;
}

/// Looks up ranked sources for candidate terms.
#[derive(Clone)]
pub struct SourceLocator {
    backend: Option<Arc<dyn RankedSearch>>,
    missing_credentials: MissingCredentialsPolicy,
    placeholder_templates: Vec<String>,
}

impl SourceLocator {
    /// Locator over `backend`; `None` means search credentials are absent.
    pub fn new(backend: Option<Arc<dyn RankedSearch>>) -> Self {
        Self {
            backend,
            missing_credentials: MissingCredentialsPolicy::Empty,
            placeholder_templates: Vec::new(),
        }
    }

    /// Choose what happens when no backend is configured.
    pub fn with_missing_credentials(
        mut self,
        policy: MissingCredentialsPolicy,
        templates: Vec<String>,
    ) -> Self {
        self.missing_credentials = policy;
        self.placeholder_templates = templates;
        self
    }

    /// Build from config, reading credentials from the configured env vars.
    pub fn from_config(config: &SearchConfig, client: RetrievalClient) -> Self {
        let backend = GoogleCustomSearch::from_config(config, client)
            .map(|g| Arc::new(g) as Arc<dyn RankedSearch>);

        if backend.is_none() {
            info!(
                key_env = %config.api_key_env,
                engine_env = %config.engine_id_env,
                policy = ?config.missing_credentials,
                "search credentials not set"
            );
        }

        Self::new(backend).with_missing_credentials(
            config.missing_credentials,
            config.placeholder_templates.clone(),
        )
    }

    /// Whether a real search backend is configured.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Ranked sources for `term`, ranks `1..=k` with `k <= limit`.
    #[instrument(skip_all, fields(term = %term, limit))]
    pub async fn locate(&self, term: &str, limit: usize) -> Vec<SourceReference> {
        if limit == 0 {
            return Vec::new();
        }

        let Some(backend) = &self.backend else {
            return self.without_backend(term, limit);
        };

        match backend.search(term, limit).await {
            Ok(hits) => {
                let refs = rank_hits(hits, limit);
                debug!(backend = backend.name(), results = refs.len(), "search complete");
                refs
            }
            Err(e) => {
                warn!(backend = backend.name(), error = %e, "search failed, no sources");
                Vec::new()
            }
        }
    }

    fn without_backend(&self, term: &str, limit: usize) -> Vec<SourceReference> {
        match self.missing_credentials {
            MissingCredentialsPolicy::Empty => Vec::new(),
            MissingCredentialsPolicy::Placeholder => {
                let hits = placeholder_hits(term, &self.placeholder_templates);
                rank_hits(hits, limit)
            }
        }
    }
}

/// Truncate to `limit` and assign ranks `1..=k` in hit order.
fn rank_hits(hits: Vec<SearchHit>, limit: usize) -> Vec<SourceReference> {
    hits.into_iter()
        .take(limit)
        .zip(1u32..)
        .map(|(hit, rank)| SourceReference {
            rank,
            title: hit.title,
            url: hit.url,
            snippet: hit.snippet,
        })
        .collect()
}

/// Synthetic hits from URL templates, used without search credentials.
fn placeholder_hits(term: &str, templates: &[String]) -> Vec<SearchHit> {
    let encoded: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();

    templates
        .iter()
        .map(|template| {
            let url = template.replace("{term}", &encoded);
            let host = url::Url::parse(&url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| "placeholder".to_string());
            SearchHit {
                title: format!("{host} search results: {term}"),
                snippet: Some(format!("Search results for {term} on {host}.")),
                url,
            }
        })
        .collect()
}
