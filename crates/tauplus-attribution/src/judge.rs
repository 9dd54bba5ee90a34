use async_trait::async_trait;
use tauplus_trajectory::{Task, Trajectory};

use crate::error::JudgeError;
use crate::types::Judgment;

/// Decides who is responsible for a failed attempt.
///
/// Implementations must return exactly one author, and a fault type only for
/// agent faults; [`Judgment`] enforces both through its [`Fault`] field.
///
/// [`Fault`]: crate::Fault
#[async_trait]
pub trait FaultJudge: Send + Sync {
  /// Stable identifier recorded with each assignment.
  fn name(&self) -> &'static str;

  /// Verdicts are informative only and must not be read as ground truth.
  fn advisory(&self) -> bool {
    false
  }

  async fn judge(&self, task: &Task, trajectory: &Trajectory) -> Result<Judgment, JudgeError>;
}
