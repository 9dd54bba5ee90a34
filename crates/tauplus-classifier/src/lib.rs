//! tauplus classifier
//!
//! Deterministic error classification. An [`ErrorClassifier`] runs an ordered
//! list of [`Detector`]s over a closed trajectory and merges their
//! [`ErrorRecord`]s. There is no randomness and no external call, so the same
//! trajectory and policy set always yield the same records in the same order.
//!
//! Categories form a closed taxonomy grouped into families (see
//! [`ErrorCategory::family`]). New detection logic plugs in through the
//! [`Detector`] trait.

mod classifier;
pub mod detectors;
mod taxonomy;

pub use classifier::{ClassifierError, ClassifierOptions, ErrorClassifier};
pub use detectors::{Detector, Evidence};
pub use taxonomy::{ErrorCategory, ErrorFamily, ErrorRecord, Severity};
