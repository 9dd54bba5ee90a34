//! tauplus config
//!
//! Serializable configuration for the evaluation harness: the domain under
//! test, concurrency and timeout limits, scoring weights, efficiency bands,
//! the tool retry policy and the fault-attribution judge.
//!
//! Configuration is loaded from a JSON file (via the CLI's `--config`) and
//! validated eagerly. A [`ConfigError`] is the only kind of failure that stops
//! a suite before it starts.

mod domain;
mod error;
mod harness;
mod judge;
mod scoring;

pub use domain::Domain;
pub use error::ConfigError;
pub use harness::{HarnessConfig, RetryPolicy};
pub use judge::{JudgeConfig, ModelJudgeConfig};
pub use scoring::{Band, EfficiencyBands, ScoringWeights};
