//! Source fetching with graceful degradation.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::{debug, instrument, warn};
use url::Url;

use siteadvisor_retrieval::{MAX_REDIRECTS, RetrievalClient};
use siteadvisor_shared::{DocumentStructure, Result, SiteAdvisorError, SourceReference};

use crate::parser::parse_document;

/// Fetches the raw markup of a page.
#[async_trait]
pub trait DocumentRetrieval: Send + Sync {
    async fn retrieve(&self, url: &Url) -> Result<String>;
}

/// [`DocumentRetrieval`] over the shared rate-limit-aware client.
#[derive(Debug, Clone)]
pub struct HttpDocumentRetrieval {
    client: RetrievalClient,
}

impl HttpDocumentRetrieval {
    pub fn new(client: RetrievalClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentRetrieval for HttpDocumentRetrieval {
    async fn retrieve(&self, url: &Url) -> Result<String> {
        self.client.try_request(url.as_str(), &[]).await
    }
}

/// Turns source references into document structures.
#[derive(Clone)]
pub struct DocumentFetcher {
    retrieval: Arc<dyn DocumentRetrieval>,
    allow_private_hosts: bool,
}

impl DocumentFetcher {
    pub fn new(retrieval: Arc<dyn DocumentRetrieval>) -> Self {
        Self {
            retrieval,
            allow_private_hosts: false,
        }
    }

    /// Allow fetching localhost and private-range hosts (tests, intranets).
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Fetch and parse one source. Never fails: any error yields the
    /// degenerate structure built from the reference itself.
    #[instrument(skip_all, fields(url = %reference.url, rank = reference.rank))]
    pub async fn fetch_and_structure(&self, reference: &SourceReference) -> DocumentStructure {
        match self.try_fetch(reference).await {
            Ok(doc) => {
                debug!(words = doc.word_count, headings = doc.headings.len(), "page structured");
                doc
            }
            Err(e) => {
                warn!(error = %e, "fetch failed, using reference only");
                DocumentStructure::degenerate(reference)
            }
        }
    }

    async fn try_fetch(&self, reference: &SourceReference) -> Result<DocumentStructure> {
        let url = Url::parse(&reference.url)
            .map_err(|e| SiteAdvisorError::validation(format!("invalid URL {}: {e}", reference.url)))?;

        if !self.allow_private_hosts && is_ssrf_target(&url) {
            return Err(SiteAdvisorError::validation(format!(
                "refusing to fetch non-public URL: {url}"
            )));
        }

        let html = self.retrieval.retrieve(&url).await?;
        Ok(parse_document(&reference.url, &html))
    }
}

/// Whether `url` must not be fetched: non-HTTP schemes and private,
/// loopback, or link-local hosts.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Redirect policy that applies [`is_ssrf_target`] to every hop.
///
/// The fetcher only vets the first URL; a client built with this policy
/// refuses a public page that redirects into a private network.
pub fn public_redirects_only() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error(format!("more than {MAX_REDIRECTS} redirects"))
        } else if is_ssrf_target(attempt.url()) {
            let refused = format!("refusing redirect to non-public URL: {}", attempt.url());
            attempt.error(refused)
        } else {
            attempt.follow()
        }
    })
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
