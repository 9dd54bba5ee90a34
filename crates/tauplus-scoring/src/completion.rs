use tauplus_trajectory::{GoalProgress, Task, Trajectory, state_match_ratio};

/// Penalty per extraneous state-changing call, and its cap.
const EXTRANEOUS_PENALTY: f64 = 0.1;
const MAX_EXTRANEOUS_PENALTY: f64 = 0.5;

/// Degree of goal match for an attempt.
///
/// Successful attempts score 1.0. Otherwise the final state is compared with
/// the target state when both are known, and the ground-truth actions and
/// outputs are compared when they are not.
pub fn task_completion(task: &Task, trajectory: &Trajectory, success: bool) -> f64 {
  if success {
    return 1.0;
  }

  let progress = GoalProgress::evaluate(task, trajectory);
  let ratio = match (&task.target_state, &trajectory.final_state) {
    (Some(target), Some(actual)) => state_match_ratio(target, actual),
    _ => match progress.ratio() {
      Some(ratio) => ratio,
      None => return 0.0,
    },
  };

  let penalty = (EXTRANEOUS_PENALTY * progress.extraneous.len() as f64).min(MAX_EXTRANEOUS_PENALTY);
  (ratio - penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tauplus_config::Domain;
  use tauplus_trajectory::Action;
  use tauplus_trajectory::testing::{TrajectoryBuilder, args};

  use super::*;

  fn task() -> Task {
    Task {
      task_id: "3".to_string(),
      domain: Domain::Airline,
      instruction: "change my flight".to_string(),
      actions: vec![
        Action::new("get_reservation_details", args(json!({"reservation_id": "ABC"}))),
        Action::new(
          "update_reservation_flights",
          args(json!({"reservation_id": "ABC", "cabin": "economy"})),
        ),
      ],
      outputs: vec![],
      policies: vec![],
      initial_state: None,
      target_state: None,
    }
  }

  #[test]
  fn success_is_full_credit() {
    let trajectory = TrajectoryBuilder::new("3").build();
    assert_eq!(task_completion(&task(), &trajectory, true), 1.0);
  }

  #[test]
  fn partial_progress_earns_partial_credit() {
    let trajectory = TrajectoryBuilder::new("3")
      .tool_ok("get_reservation_details", json!({"reservation_id": "ABC"}), json!({}))
      .build();
    assert_eq!(task_completion(&task(), &trajectory, false), 0.5);
  }

  #[test]
  fn extraneous_mutations_are_penalised() {
    let trajectory = TrajectoryBuilder::new("3")
      .tool_ok("get_reservation_details", json!({"reservation_id": "ABC"}), json!({}))
      .tool_ok("cancel_reservation", json!({"reservation_id": "ABC"}), json!({}))
      .tool_ok("book_reservation", json!({"user_id": "u"}), json!({}))
      .build();
    assert!((task_completion(&task(), &trajectory, false) - 0.3).abs() < 1e-12);
  }

  #[test]
  fn state_comparison_is_used_when_available() {
    let mut task = task();
    task.target_state = Some(json!({"ABC": {"cabin": "economy", "flights": 2}}));
    let trajectory = TrajectoryBuilder::new("3")
      .final_state(json!({"ABC": {"cabin": "business", "flights": 2}}))
      .build();
    assert_eq!(task_completion(&task, &trajectory, false), 0.5);
  }

  #[test]
  fn no_targets_and_failure_scores_zero() {
    let mut task = task();
    task.actions.clear();
    let trajectory = TrajectoryBuilder::new("3").user("hi").build();
    assert_eq!(task_completion(&task, &trajectory, false), 0.0);
  }
}
