//! Google Custom Search JSON API backend.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use siteadvisor_retrieval::RetrievalClient;
use siteadvisor_shared::{Result, SearchConfig, SiteAdvisorError, read_secret};

use crate::{RankedSearch, SearchHit};

/// The API returns at most this many items per request.
const MAX_RESULTS_PER_REQUEST: usize = 10;

/// Response envelope; only the fields we read.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

/// Ranked search via the Custom Search JSON API.
pub struct GoogleCustomSearch {
    client: RetrievalClient,
    endpoint: String,
    api_key: String,
    engine_id: String,
    language: String,
}

impl GoogleCustomSearch {
    pub fn new(
        client: RetrievalClient,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
            language: language.into(),
        }
    }

    /// Build from config; `None` when either credential env var is unset.
    pub fn from_config(config: &SearchConfig, client: RetrievalClient) -> Option<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        let engine_id = read_secret(&config.engine_id_env)?;
        Some(Self::new(
            client,
            config.endpoint.clone(),
            api_key,
            engine_id,
            config.language.clone(),
        ))
    }
}

#[async_trait]
impl RankedSearch for GoogleCustomSearch {
    #[instrument(skip_all, fields(query = %query, count))]
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let num = count.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();
        let params = [
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
            ("hl", self.language.as_str()),
        ];

        let Some(body) = self.client.request(&self.endpoint, &params).await else {
            return Ok(Vec::new());
        };

        let response: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| SiteAdvisorError::parse(format!("search response: {e}")))?;

        let hits: Vec<SearchHit> = response
            .items
            .into_iter()
            .filter_map(|item| {
                let url = item.link.filter(|l| !l.is_empty())?;
                let snippet = item
                    .snippet
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| Some(item.title.clone()).filter(|t| !t.is_empty()));
                Some(SearchHit {
                    title: item.title,
                    url,
                    snippet,
                })
            })
            .take(count)
            .collect();

        debug!(hits = hits.len(), "search response parsed");
        Ok(hits)
    }

    fn name(&self) -> &str {
        "google-cse"
    }
}
