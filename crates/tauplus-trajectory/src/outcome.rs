//! Binary success and hand-off detection.

use serde::{Deserialize, Serialize};

use crate::goal::{GoalProgress, values_match};
use crate::task::Task;
use crate::trajectory::{Termination, Trajectory};

/// Reward values within this distance of 1.0 count as success.
pub const REWARD_TOLERANCE: f64 = 1e-6;

/// Decide whether the attempt reached the task's goal.
///
/// Goal-state comparison wins when both states are known; otherwise an
/// environment-reported reward; otherwise the ground-truth action match.
pub fn binary_outcome(task: &Task, trajectory: &Trajectory) -> bool {
  if trajectory.termination == Termination::Cancelled {
    return false;
  }

  if let (Some(target), Some(actual)) = (&task.target_state, &trajectory.final_state) {
    let progress = GoalProgress::evaluate(task, trajectory);
    return values_match(target, actual) && progress.outputs.iter().all(|o| *o);
  }

  if let Some(reward) = trajectory.reward {
    return (reward - 1.0).abs() <= REWARD_TOLERANCE;
  }

  GoalProgress::evaluate(task, trajectory).is_complete()
}

/// Hand-off to a human observed in a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
  pub turn_index: usize,
  /// The task did not call for a hand-off.
  pub premature: bool,
}

pub fn detect_transfer(task: &Task, trajectory: &Trajectory) -> Option<Transfer> {
  let turn_index = trajectory.transfer_turn(task.catalog())?;
  Some(Transfer {
    turn_index,
    premature: !task.expects_transfer(),
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tauplus_config::Domain;

  use super::*;
  use crate::task::Action;
  use crate::testing::{TrajectoryBuilder, args};

  fn task(target_state: Option<serde_json::Value>) -> Task {
    Task {
      task_id: "1".to_string(),
      domain: Domain::Retail,
      instruction: "cancel".to_string(),
      actions: vec![Action::new(
        "cancel_pending_order",
        args(json!({"order_id": "#W1", "reason": "no longer needed"})),
      )],
      outputs: vec![],
      policies: vec![],
      initial_state: None,
      target_state,
    }
  }

  #[test]
  fn state_comparison_takes_precedence_over_reward() {
    let mut trajectory = TrajectoryBuilder::new("1").user("cancel").build();
    trajectory.final_state = Some(json!({"orders": {"#W1": "cancelled"}}));
    trajectory.reward = Some(0.0);
    assert!(binary_outcome(
      &task(Some(json!({"orders": {"#W1": "cancelled"}}))),
      &trajectory
    ));
  }

  #[test]
  fn reward_is_used_within_tolerance() {
    let mut trajectory = TrajectoryBuilder::new("1").user("cancel").build();
    trajectory.reward = Some(0.9999999);
    assert!(binary_outcome(&task(None), &trajectory));
    trajectory.reward = Some(0.99);
    assert!(!binary_outcome(&task(None), &trajectory));
  }

  #[test]
  fn falls_back_to_action_match() {
    let trajectory = TrajectoryBuilder::new("1")
      .user("cancel #W1, yes")
      .tool_ok(
        "cancel_pending_order",
        json!({"order_id": "#W1", "reason": "no longer needed"}),
        json!({}),
      )
      .build();
    assert!(binary_outcome(&task(None), &trajectory));
  }

  #[test]
  fn cancelled_attempts_never_succeed() {
    let mut trajectory = TrajectoryBuilder::new("1").build();
    trajectory.reward = Some(1.0);
    trajectory.termination = Termination::Cancelled;
    assert!(!binary_outcome(&task(None), &trajectory));
  }

  #[test]
  fn transfer_is_premature_unless_expected() {
    let trajectory = TrajectoryBuilder::new("1")
      .user("help")
      .tool_ok("transfer_to_human_agents", json!({"summary": "s"}), json!("ok"))
      .build();
    assert_eq!(
      detect_transfer(&task(None), &trajectory),
      Some(Transfer {
        turn_index: 1,
        premature: true
      })
    );

    let mut expected = task(None);
    expected
      .actions
      .push(Action::new("transfer_to_human_agents", args(json!({"summary": "s"}))));
    assert!(!detect_transfer(&expected, &trajectory).unwrap().premature);
  }
}
