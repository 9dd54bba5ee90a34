//! tauplus eval
//!
//! Evaluation of closed trajectories into [`AttemptRecord`]s, the versioned
//! per-attempt artifact every downstream report reads.
//!
//! - [`Evaluator`]: one trajectory at a time; scorer, classifier and (for
//!   failures) fault attributor.
//! - [`BatchEvaluator`]: many recorded trajectories under a concurrency
//!   limit, results in input order.
//!
//! Evaluation never fails an attempt outright. Malformed input becomes an
//! [`AttemptStatus::Invalid`] record, which aggregation excludes and counts
//! separately.

mod batch;
mod error;
mod evaluator;
mod record;

pub use batch::BatchEvaluator;
pub use error::EvalError;
pub use evaluator::Evaluator;
pub use record::{AttemptRecord, AttemptStatus, RECORD_SCHEMA_VERSION, SchemaVersion};
