//! Shared types, error model, and configuration for SiteAdvisor.
//!
//! This crate is the foundation depended on by all other SiteAdvisor crates.
//! It provides:
//! - [`SiteAdvisorError`]: the unified error type
//! - Domain types ([`CandidatePlan`], [`SourceReference`], [`DocumentStructure`],
//!   [`TopicAnalysis`], [`StrategyRecommendation`], [`ResearchReport`])
//! - Configuration ([`AppConfig`], config loading)
//! - The word tokenizer shared by the parser and degenerate documents

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackoffKind, FetchConfig, GenerationConfig, LimitsConfig, MissingCredentialsPolicy,
    RetryConfig, SearchConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, read_secret,
};
pub use error::{Result, SiteAdvisorError};
pub use text::{term_frequencies, tokenize};
pub use types::{
    CandidatePlan, CandidateTerm, DEFAULT_PRIORITY, DocumentStructure, Heading, HeadingNode,
    Intent, MAX_PRIORITY, MIN_PRIORITY, PageStructureMetrics, ProgressEntry, ResearchReport,
    RunId, SourceReference, Stage, StrategyRecommendation, TermStrategy, TopicAnalysis,
    clamp_priority, normalize_priority,
};
