//! Research pipeline orchestration and domain logic for SiteAdvisor.
//!
//! This crate ties together term planning, source lookup, document
//! structuring, metric aggregation and strategy synthesis into a single
//! degradable run ([`Pipeline::run`]).

pub mod analyzer;
pub mod pipeline;
pub mod planner;
pub mod state;
pub mod strategist;

pub use pipeline::{Pipeline, ProgressReporter, SilentProgress};
pub use planner::CandidateGenerator;
pub use state::PipelineState;
pub use strategist::StrategySynthesizer;
