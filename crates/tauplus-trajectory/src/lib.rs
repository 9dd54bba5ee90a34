//! tauplus trajectory
//!
//! The data model shared by every stage of the harness:
//!
//! - [`Task`]: immutable goal definition (ground-truth actions, required
//!   outputs, policy constraints, optional target state).
//! - [`TrajectoryRecorder`]: append-only recording of one attempt. Tool calls
//!   occupy their slot from the moment they are issued and must be resolved
//!   exactly once before the recorder can be closed.
//! - [`Trajectory`]: the frozen result of closing a recorder.
//!
//! Shared analyses over a closed trajectory live here too, so scoring,
//! classification and fault attribution agree on them: [`GoalProgress`],
//! policy checks, binary outcome and transfer detection.
//!
//! ```text
//!   begin_tool_call ──► [ Pending ] ──resolve_tool_call──► [ Resolved ]
//!   record_message  ──► [ Message ]
//!                              │
//!                          close()  ──► Trajectory (immutable)
//! ```

mod catalog;
mod error;
pub mod estimate;
mod goal;
pub mod import;
mod outcome;
mod policy;
mod recorder;
mod task;
mod trajectory;
mod turn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{DEFAULT_TOOL_DURATION_SECS, TRANSFER_TOOL, ToolCatalog};
pub use error::TrajectoryError;
pub use goal::{ActionMatch, GoalProgress, arguments_match, state_match_ratio, values_match};
pub use outcome::{REWARD_TOLERANCE, Transfer, binary_outcome, detect_transfer};
pub use policy::{
  PolicyCheck, PolicyConstraint, PolicyStatus, Violation, check_policies, is_affirmative,
};
pub use recorder::{CallHandle, Closing, Resolution, TrajectoryRecorder};
pub use task::{Action, Task};
pub use trajectory::{Sentiment, Termination, TerminationSide, TokenUsage, Trajectory, UserSignal};
pub use turn::{Message, Role, ToolCallRecord, ToolFailureKind, ToolOutcome, Turn};
