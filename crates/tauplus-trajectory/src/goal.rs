//! Goal progress: how far a trajectory got toward the task's ground truth.

use serde_json::{Map, Value};

use crate::task::Task;
use crate::trajectory::Trajectory;
use crate::turn::Turn;

/// How a ground-truth action was matched in the trajectory.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionMatch {
  /// Performed successfully with equivalent arguments.
  Exact { turn_index: usize },
  /// The right tool was called, but with different arguments.
  WrongArguments { turn_index: usize },
  Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalProgress {
  /// One entry per ground-truth action, in task order.
  pub actions: Vec<ActionMatch>,
  /// One entry per required output: whether the agent communicated it.
  pub outputs: Vec<bool>,
  /// Successful mutating calls that match no ground-truth action.
  pub extraneous: Vec<usize>,
}

impl GoalProgress {
  pub fn evaluate(task: &Task, trajectory: &Trajectory) -> Self {
    let catalog = task.catalog();
    let calls: Vec<(usize, &crate::turn::ToolCallRecord)> = trajectory.tool_calls().collect();
    let mut used = vec![false; calls.len()];
    let mut actions = vec![ActionMatch::Missing; task.actions.len()];

    // Exact matches first so a later correct call is not consumed as a
    // wrong-argument match for an earlier action.
    for (slot, action) in actions.iter_mut().zip(&task.actions) {
      if let Some(i) = (0..calls.len()).find(|&i| {
        !used[i]
          && calls[i].1.outcome.is_success()
          && calls[i].1.name == action.name
          && arguments_match(&action.arguments, &calls[i].1.arguments)
      }) {
        used[i] = true;
        *slot = ActionMatch::Exact {
          turn_index: calls[i].0,
        };
      }
    }

    for (slot, action) in actions.iter_mut().zip(&task.actions) {
      if *slot != ActionMatch::Missing {
        continue;
      }
      if let Some(i) = (0..calls.len()).find(|&i| !used[i] && calls[i].1.name == action.name) {
        used[i] = true;
        *slot = ActionMatch::WrongArguments {
          turn_index: calls[i].0,
        };
      }
    }

    let extraneous = calls
      .iter()
      .zip(&used)
      .filter(|((_, call), used)| {
        !**used && call.outcome.is_success() && catalog.is_mutating(&call.name)
      })
      .map(|((index, _), _)| *index)
      .collect();

    let outputs = task
      .outputs
      .iter()
      .map(|output| output_communicated(output, trajectory))
      .collect();

    Self {
      actions,
      outputs,
      extraneous,
    }
  }

  pub fn target_count(&self) -> usize {
    self.actions.len() + self.outputs.len()
  }

  /// Credit earned over all targets: exact 1.0, wrong arguments 0.5.
  ///
  /// `None` when the task defines no targets.
  pub fn ratio(&self) -> Option<f64> {
    if self.target_count() == 0 {
      return None;
    }
    let action_credit: f64 = self
      .actions
      .iter()
      .map(|m| match m {
        ActionMatch::Exact { .. } => 1.0,
        ActionMatch::WrongArguments { .. } => 0.5,
        ActionMatch::Missing => 0.0,
      })
      .sum();
    let output_credit = self.outputs.iter().filter(|o| **o).count() as f64;
    Some((action_credit + output_credit) / self.target_count() as f64)
  }

  /// Every target met and nothing extra changed.
  pub fn is_complete(&self) -> bool {
    self
      .actions
      .iter()
      .all(|m| matches!(m, ActionMatch::Exact { .. }))
      && self.outputs.iter().all(|o| *o)
      && self.extraneous.is_empty()
  }

  /// Some but not all progress.
  pub fn is_partial(&self) -> bool {
    matches!(self.ratio(), Some(r) if r > 0.0 && r < 1.0)
  }

  pub fn missing<'t>(&self, task: &'t Task) -> Vec<&'t str> {
    self
      .actions
      .iter()
      .zip(&task.actions)
      .filter(|(m, _)| **m == ActionMatch::Missing)
      .map(|(_, a)| a.name.as_str())
      .collect()
  }

  pub fn wrong_arguments<'t>(&self, task: &'t Task) -> Vec<(usize, &'t crate::task::Action)> {
    self
      .actions
      .iter()
      .zip(&task.actions)
      .filter_map(|(m, a)| match m {
        ActionMatch::WrongArguments { turn_index } => Some((*turn_index, a)),
        _ => None,
      })
      .collect()
  }
}

/// Argument maps are equivalent when they hold the same keys and each pair of
/// values matches under [`values_match`].
pub fn arguments_match(expected: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
  expected.len() == actual.len()
    && expected
      .iter()
      .all(|(k, v)| actual.get(k).is_some_and(|a| values_match(v, a)))
}

/// JSON equality that treats `1` and `1.0` as the same number.
pub fn values_match(expected: &Value, actual: &Value) -> bool {
  match (expected, actual) {
    (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
      (Some(a), Some(b)) => (a - b).abs() <= 1e-9,
      _ => a == b,
    },
    (Value::Array(a), Value::Array(b)) => {
      a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
    }
    (Value::Object(a), Value::Object(b)) => arguments_match(a, b),
    _ => expected == actual,
  }
}

/// Fraction of the target state's leaf values reproduced in `actual`.
///
/// Leaves are scalars and empty containers; object keys and array positions
/// are followed in lockstep.
pub fn state_match_ratio(target: &Value, actual: &Value) -> f64 {
  let (matched, total) = leaf_match(target, Some(actual));
  if total == 0 {
    return 0.0;
  }
  matched as f64 / total as f64
}

fn leaf_match(target: &Value, actual: Option<&Value>) -> (usize, usize) {
  match target {
    Value::Object(map) if !map.is_empty() => map.iter().fold((0, 0), |(m, t), (key, value)| {
      let (dm, dt) = leaf_match(value, actual.and_then(|a| a.get(key.as_str())));
      (m + dm, t + dt)
    }),
    Value::Array(items) if !items.is_empty() => {
      items.iter().enumerate().fold((0, 0), |(m, t), (i, value)| {
        let (dm, dt) = leaf_match(value, actual.and_then(|a| a.get(i)));
        (m + dm, t + dt)
      })
    }
    leaf => (usize::from(actual.is_some_and(|a| values_match(leaf, a))), 1),
  }
}

fn output_communicated(output: &str, trajectory: &Trajectory) -> bool {
  let needle = output.to_lowercase();
  trajectory.turns.iter().any(|turn| match turn {
    Turn::Message(m) if m.role == crate::turn::Role::Agent => {
      m.content.to_lowercase().replace(',', "").contains(&needle)
    }
    _ => false,
  })
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tauplus_config::Domain;

  use super::*;
  use crate::task::Action;
  use crate::testing::{TrajectoryBuilder, args};
  use crate::turn::ToolFailureKind;

  fn task() -> Task {
    Task {
      task_id: "7".to_string(),
      domain: Domain::Retail,
      instruction: "return the lamp".to_string(),
      actions: vec![
        Action::new("get_order_details", args(json!({"order_id": "#W1"}))),
        Action::new(
          "return_delivered_order_items",
          args(json!({"order_id": "#W1", "item_ids": ["1"], "payment_method_id": "pm_1"})),
        ),
      ],
      outputs: vec!["54.04".to_string()],
      policies: vec![],
      initial_state: None,
      target_state: None,
    }
  }

  #[test]
  fn full_match_is_complete() {
    let trajectory = TrajectoryBuilder::new("7")
      .tool_ok("get_order_details", json!({"order_id": "#W1"}), json!({}))
      .tool_ok(
        "return_delivered_order_items",
        json!({"order_id": "#W1", "item_ids": ["1"], "payment_method_id": "pm_1"}),
        json!({}),
      )
      .agent("Your refund of $54.04 is on its way.")
      .build();

    let progress = GoalProgress::evaluate(&task(), &trajectory);
    assert!(progress.is_complete());
    assert_eq!(progress.ratio(), Some(1.0));
  }

  #[test]
  fn wrong_arguments_earn_half_credit() {
    let trajectory = TrajectoryBuilder::new("7")
      .tool_ok("get_order_details", json!({"order_id": "#W1"}), json!({}))
      .tool_ok(
        "return_delivered_order_items",
        json!({"order_id": "#W1", "item_ids": ["2"], "payment_method_id": "pm_1"}),
        json!({}),
      )
      .build();

    let progress = GoalProgress::evaluate(&task(), &trajectory);
    assert_eq!(
      progress.actions[1],
      ActionMatch::WrongArguments { turn_index: 1 }
    );
    assert_eq!(progress.ratio(), Some(1.5 / 3.0));
    assert!(progress.is_partial());
    // The mismatched call is attributed to the action, not counted as extra.
    assert!(progress.extraneous.is_empty());
  }

  #[test]
  fn failed_call_with_right_tool_is_wrong_arguments_not_exact() {
    let trajectory = TrajectoryBuilder::new("7")
      .tool_err("get_order_details", json!({"order_id": "#W1"}), ToolFailureKind::Backend)
      .build();
    let progress = GoalProgress::evaluate(&task(), &trajectory);
    assert_eq!(progress.actions[0], ActionMatch::WrongArguments { turn_index: 0 });
    assert_eq!(progress.missing(&task()), vec!["return_delivered_order_items"]);
  }

  #[test]
  fn unmatched_mutations_are_extraneous() {
    let trajectory = TrajectoryBuilder::new("7")
      .tool_ok("cancel_pending_order", json!({"order_id": "#W9"}), json!({}))
      .tool_ok("get_user_details", json!({"user_id": "u"}), json!({}))
      .build();
    let progress = GoalProgress::evaluate(&task(), &trajectory);
    assert_eq!(progress.extraneous, vec![0]);
    assert!(!progress.is_complete());
  }

  #[test]
  fn state_ratio_counts_matching_leaves() {
    let target = json!({
      "orders": {"#W1": {"status": "cancelled", "items": [1, 2]}},
      "balance": 10
    });
    let actual = json!({
      "orders": {"#W1": {"status": "pending", "items": [1, 2]}},
      "balance": 10.0
    });
    assert_eq!(state_match_ratio(&target, &actual), 0.75);
    assert_eq!(state_match_ratio(&target, &target), 1.0);
    assert_eq!(state_match_ratio(&target, &json!(null)), 0.0);
  }

  #[test]
  fn numbers_compare_by_value() {
    assert!(values_match(&json!(1), &json!(1.0)));
    assert!(values_match(&json!({"a": [1, 2]}), &json!({"a": [1.0, 2.0]})));
    assert!(!values_match(&json!("1"), &json!(1)));
  }
}
