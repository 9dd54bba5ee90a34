//! tauplus scoring
//!
//! Turns a closed trajectory into a [`ScoreResult`] across four dimensions:
//!
//! | dimension         | source                                                   |
//! |-------------------|----------------------------------------------------------|
//! | task completion   | goal-state or ground-truth match, partial credit allowed |
//! | efficiency        | turn band × tool band × tool success rate                |
//! | policy adherence  | satisfied / applicable policy constraints                |
//! | user satisfaction | terminal user signal, lexicon fallback                   |
//!
//! The composite is the configured weighted sum of the four and is always
//! derived, never stored on its own.

mod adherence;
mod completion;
mod efficiency;
mod result;
mod satisfaction;
mod scorer;

pub use adherence::policy_adherence;
pub use completion::task_completion;
pub use efficiency::{EfficiencyBreakdown, band_factor, efficiency};
pub use result::{COMPOSITE_TOLERANCE, ScoreError, ScoreResult, SubScores};
pub use satisfaction::{sentiment_score, user_satisfaction};
pub use scorer::CompositeScorer;
