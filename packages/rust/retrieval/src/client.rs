//! Rate-limit-aware GET client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};

use siteadvisor_shared::{Result, SiteAdvisorError};

use crate::policy::{RetryPolicy, Sleeper, TokioSleeper};

/// User-Agent string for every outbound request.
pub const USER_AGENT: &str = concat!("SiteAdvisor/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
pub const MAX_REDIRECTS: usize = 5;

/// Read-only HTTP client with retry and 429 backoff.
///
/// Cheap to clone; clones share the connection pool and the sleeper.
#[derive(Clone)]
pub struct RetrievalClient {
    client: Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetrievalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetrievalClient {
    /// Build a client with the given retry policy and per-request timeout.
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Result<Self> {
        Self::with_redirect_policy(policy, timeout, Policy::limited(MAX_REDIRECTS))
    }

    /// Like [`new`](Self::new) with a caller-supplied redirect policy, e.g.
    /// one that vets every hop.
    pub fn with_redirect_policy(
        policy: RetryPolicy,
        timeout: Duration,
        redirect: Policy,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect)
            .timeout(timeout)
            .build()
            .map_err(|e| SiteAdvisorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used between rate-limited attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with query `params`, returning the body or `None`.
    ///
    /// `None` means every attempt failed; it is never a fatal condition.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn request(&self, url: &str, params: &[(&str, &str)]) -> Option<String> {
        match self.try_request(url, params).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(error = %e, "retrieval gave up");
                None
            }
        }
    }

    /// Like [`request`](Self::request) but keeps the final error.
    pub async fn try_request(&self, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let attempts = self.policy.attempts();
        let mut last_err = SiteAdvisorError::Network(format!("{url}: no attempt made"));

        for attempt in 1..=attempts {
            match self.attempt(url, params).await {
                Ok(body) => return Ok(body),
                Err(SiteAdvisorError::RateLimited(msg)) => {
                    if attempt == attempts {
                        return Err(SiteAdvisorError::RateLimited(msg));
                    }
                    let delay = self.policy.backoff_for(attempt);
                    debug!(attempt, attempts, ?delay, "rate limited, backing off");
                    self.sleeper.sleep(delay).await;
                }
                Err(e) => {
                    debug!(attempt, attempts, error = %e, "attempt failed");
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }

    /// One GET; 429 is reported as [`SiteAdvisorError::RateLimited`].
    async fn attempt(&self, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SiteAdvisorError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SiteAdvisorError::RateLimited(format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SiteAdvisorError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| SiteAdvisorError::Network(format!("{url}: body read failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn client_with(policy: RetryPolicy, sleeper: Arc<RecordingSleeper>) -> RetrievalClient {
        RetrievalClient::new(policy, Duration::from_secs(5))
            .unwrap()
            .with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn gives_up_after_repeated_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_with(
            RetryPolicy::fixed(2, Duration::from_millis(750)),
            sleeper.clone(),
        );

        let body = client
            .request(&format!("{}/search", server.uri()), &[])
            .await;

        assert!(body.is_none());
        let delays = sleeper.delays.lock().unwrap().clone();
        assert_eq!(delays, vec![Duration::from_millis(750); 2]);
    }

    #[tokio::test]
    async fn recovers_after_one_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_with(RetryPolicy::fixed(2, Duration::from_millis(10)), sleeper.clone());

        let body = client.request(&format!("{}/page", server.uri()), &[]).await;

        assert_eq!(body.as_deref(), Some("<html>ok</html>"));
        assert_eq!(sleeper.delays.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn server_errors_retry_without_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_with(RetryPolicy::fixed(2, Duration::from_secs(1)), sleeper.clone());

        let result = client.try_request(&server.uri(), &[]).await;

        assert!(matches!(result, Err(SiteAdvisorError::Network(_))));
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn final_rate_limit_is_reported_as_such() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_with(RetryPolicy::no_retry(), sleeper.clone());

        let result = client.try_request(&server.uri(), &[]).await;

        assert!(matches!(result, Err(SiteAdvisorError::RateLimited(_))));
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forwards_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "ball bearing"))
            .and(query_param("num", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with(RetryPolicy::no_retry(), Arc::default());

        let body = client
            .request(&server.uri(), &[("q", "ball bearing"), ("num", "3")])
            .await;

        assert_eq!(body.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn unreachable_host_yields_none() {
        let client = client_with(RetryPolicy::fixed(1, Duration::ZERO), Arc::default());
        // Port 9 (discard) on localhost is not listening in test environments.
        let body = client.request("http://127.0.0.1:9/", &[]).await;
        assert!(body.is_none());
    }
}
