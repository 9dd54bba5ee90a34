//! tauplus attribution
//!
//! Post-hoc fault attribution for failed attempts. A [`FaultJudge`] names
//! exactly one responsible party; agent faults also get a [`FaultType`].
//!
//! | judge              | calls out | advisory |
//! |--------------------|-----------|----------|
//! | [`RuleBasedJudge`] | no        | no       |
//! | [`ModelJudge`]     | HTTP      | yes      |
//!
//! [`FaultAttributor`] wraps either one with a timeout and degrades every
//! failure to [`Attribution::Unattributed`]. Attribution never changes the
//! binary outcome of an attempt.

mod attributor;
mod error;
mod judge;
mod model;
mod prompt;
mod rule;
mod types;

pub use attributor::FaultAttributor;
pub use error::JudgeError;
pub use judge::FaultJudge;
pub use model::{ModelJudge, chat_completions_url};
pub use rule::RuleBasedJudge;
pub use types::{Attribution, Fault, FaultAssignment, FaultAuthor, FaultType, Judgment};
