//! Resilient read-only HTTP retrieval.
//!
//! Every networked lookup in SiteAdvisor (ranked search, document fetch) goes
//! through [`RetrievalClient`], which retries failed GETs according to a
//! [`RetryPolicy`] and backs off on HTTP 429. Failure never escapes as an
//! error from [`RetrievalClient::request`]: callers get `None` and treat it
//! exactly like "no results".

mod client;
mod policy;

pub use client::{MAX_REDIRECTS, RetrievalClient, USER_AGENT};
pub use policy::{BackoffSchedule, RetryPolicy, Sleeper, TokioSleeper};
