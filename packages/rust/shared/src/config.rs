//! Application configuration for SiteAdvisor.
//!
//! User config lives at `~/.siteadvisor/siteadvisor.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored in the file, only the names of the
//! environment variables holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteAdvisorError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "siteadvisor.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".siteadvisor";

// ---------------------------------------------------------------------------
// Config structs (matching siteadvisor.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline ceilings and concurrency.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Retry policy for networked retrieval.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Text generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Ranked search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Document fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Candidate terms carried past the plan stage (highest priority first).
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,

    /// Source references kept per term.
    #[serde(default = "default_max_sources_per_term")]
    pub max_sources_per_term: usize,

    /// Documents analyzed per term.
    #[serde(default = "default_max_pages_per_term")]
    pub max_pages_per_term: usize,

    /// Concurrent lookups/fetches within one stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Optional wall-clock budget for one run, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_terms: default_max_terms(),
            max_sources_per_term: default_max_sources_per_term(),
            max_pages_per_term: default_max_pages_per_term(),
            concurrency: default_concurrency(),
            run_deadline_secs: None,
        }
    }
}

fn default_max_terms() -> usize {
    2
}
fn default_max_sources_per_term() -> usize {
    3
}
fn default_max_pages_per_term() -> usize {
    5
}
fn default_concurrency() -> usize {
    4
}

/// Backoff growth between rate-limited attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffKind {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles per retry, capped at `max_backoff_ms`.
    Exponential,
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before retrying a 429 response, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Backoff schedule.
    #[serde(default)]
    pub schedule: BackoffKind,

    /// Upper bound for the exponential schedule, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            schedule: BackoffKind::default(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    2_000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Model used for planning and strategy.
    #[serde(default = "default_model")]
    pub model: String,

    /// Cap on generated candidate terms.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Rationale strings are truncated to this many characters.
    #[serde(default = "default_rationale_max_chars")]
    pub rationale_max_chars: usize,

    /// Terms covered by the deterministic strategy fallback.
    #[serde(default = "default_strategy_top_terms")]
    pub strategy_top_terms: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_generation_key_env(),
            base_url: default_generation_base_url(),
            model: default_model(),
            max_candidates: default_max_candidates(),
            rationale_max_chars: default_rationale_max_chars(),
            strategy_top_terms: default_strategy_top_terms(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_generation_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4.1-mini".into()
}
fn default_max_candidates() -> usize {
    12
}
fn default_rationale_max_chars() -> usize {
    200
}
fn default_strategy_top_terms() -> usize {
    10
}
fn default_generation_timeout() -> u64 {
    60
}

/// What the source locator does when search credentials are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingCredentialsPolicy {
    /// Return no sources for every term.
    #[default]
    Empty,
    /// Build sources from `placeholder_templates`.
    Placeholder,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Name of the env var holding the search engine id.
    #[serde(default = "default_engine_id_env")]
    pub engine_id_env: String,

    /// Search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Behaviour when credentials are missing.
    #[serde(default)]
    pub missing_credentials: MissingCredentialsPolicy,

    /// URL templates for the placeholder policy; `{term}` is substituted.
    #[serde(default = "default_placeholder_templates")]
    pub placeholder_templates: Vec<String>,

    /// Interface language hint passed to the search API.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            engine_id_env: default_engine_id_env(),
            endpoint: default_search_endpoint(),
            missing_credentials: MissingCredentialsPolicy::default(),
            placeholder_templates: default_placeholder_templates(),
            language: default_language(),
        }
    }
}

fn default_search_key_env() -> String {
    "GOOGLE_SEARCH_API_KEY".into()
}
fn default_engine_id_env() -> String {
    "GOOGLE_SEARCH_CX".into()
}
fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_placeholder_templates() -> Vec<String> {
    vec![
        "https://www.monotaro.com/s/q/{term}/".into(),
        "https://jp.misumi-ec.com/vona2/result/?Keyword={term}".into(),
    ]
}
fn default_language() -> String {
    "ja".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Allow fetching loopback/private hosts (local test servers only).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            allow_private_hosts: false,
        }
    }
}

fn default_fetch_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.siteadvisor/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SiteAdvisorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.siteadvisor/siteadvisor.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteAdvisorError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SiteAdvisorError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteAdvisorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteAdvisorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteAdvisorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the named env var. Unset or blank means absent.
pub fn read_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
