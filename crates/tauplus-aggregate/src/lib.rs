//! tauplus aggregate
//!
//! Suite statistics as a pure fold over [`AttemptRecord`]s: no shared
//! counters, no mutation outside [`SuiteSummary::from_records`].
//!
//! pass^k uses C(c, k) / C(n, k) per task, averaged over tasks; pass@k
//! (1 − C(n − c, k) / C(n, k)) is reported beside it. Both equal c / n at
//! k = 1. Percentages are display helpers computed from counts.
//!
//! [`AttemptRecord`]: tauplus_eval::AttemptRecord

mod estimator;
mod summary;

pub use estimator::{pass_at, pass_hat};
pub use summary::{PassK, SuiteSummary, percentage};
