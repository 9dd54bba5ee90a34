use async_trait::async_trait;
use serde_json::Value;
use tauplus_trajectory::{
  GoalProgress, Role, Task, TerminationSide, Termination, Trajectory, Turn, arguments_match,
  detect_transfer, values_match,
};
use tracing::debug;

use crate::error::JudgeError;
use crate::judge::FaultJudge;
use crate::types::{Fault, FaultType, Judgment};

/// Deterministic judge built from trajectory evidence alone.
///
/// Environment faults are checked first, then user faults; whatever remains
/// is the agent's, with the fault type resolved in a fixed order:
///
/// ```text
/// called_wrong_tool → used_wrong_tool_argument → timeout_or_api_error
///   → goal_partially_completed → other
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedJudge;

impl RuleBasedJudge {
  pub fn new() -> Self {
    Self
  }

  pub fn decide(&self, task: &Task, trajectory: &Trajectory) -> Judgment {
    let progress = GoalProgress::evaluate(task, trajectory);
    let judgment = environment_fault(task, trajectory)
      .or_else(|| user_fault(task, trajectory, &progress))
      .unwrap_or_else(|| agent_fault(task, trajectory, &progress));
    debug!(
      task_id = %task.task_id,
      trial = trajectory.trial,
      fault = %judgment.fault,
      "fault_decided"
    );
    judgment
  }
}

#[async_trait]
impl FaultJudge for RuleBasedJudge {
  fn name(&self) -> &'static str {
    "rule_based"
  }

  async fn judge(&self, task: &Task, trajectory: &Trajectory) -> Result<Judgment, JudgeError> {
    Ok(self.decide(task, trajectory))
  }
}

fn environment_fault(task: &Task, trajectory: &Trajectory) -> Option<Judgment> {
  if trajectory.termination.side() == TerminationSide::Environment {
    return Some(Judgment::new(
      Fault::Environment,
      trajectory.termination.describe(),
      0.9,
    ));
  }

  // A ground-truth call the agent got right that the backend still failed,
  // and that never succeeded later.
  let calls: Vec<_> = trajectory.tool_calls().collect();
  for (position, (_, call)) in calls.iter().enumerate() {
    let Some(kind) = call.outcome.failure_kind() else {
      continue;
    };
    if !kind.is_environmental() {
      continue;
    }
    let required = task
      .actions
      .iter()
      .any(|a| a.name == call.name && arguments_match(&a.arguments, &call.arguments));
    let recovered = calls[position + 1..].iter().any(|(_, later)| {
      later.outcome.is_success()
        && later.name == call.name
        && arguments_match(&later.arguments, &call.arguments)
    });
    if required && !recovered {
      return Some(Judgment::new(
        Fault::Environment,
        format!(
          "required call `{}` failed with a {kind:?} error after {} attempt(s)",
          call.name, call.attempts
        ),
        0.85,
      ));
    }
  }
  None
}

fn user_fault(task: &Task, trajectory: &Trajectory, progress: &GoalProgress) -> Option<Judgment> {
  if trajectory.termination.side() == TerminationSide::User {
    return Some(Judgment::new(
      Fault::User,
      trajectory.termination.describe(),
      0.8,
    ));
  }

  let instruction = task.instruction.to_lowercase();
  for (turn_index, action) in progress.wrong_arguments(task) {
    let Some(call) = trajectory.turns.get(turn_index).and_then(Turn::as_tool_call) else {
      continue;
    };
    let user_said = said_before(trajectory, turn_index, |role| role == Role::User);
    let seen = seen_before(trajectory, turn_index);

    for (key, expected) in &action.arguments {
      let Some(actual) = call.arguments.get(key) else {
        continue;
      };
      if values_match(expected, actual) {
        continue;
      }

      // The agent repeated something the user made up.
      let misstated = scalar_terms(actual).into_iter().find(|term| {
        user_said.contains(term.as_str())
          && !instruction.contains(term.as_str())
          && !scalar_terms(expected).contains(term)
      });
      if let Some(term) = misstated {
        return Some(Judgment::new(
          Fault::User,
          format!(
            "user supplied `{term}` for `{key}` of `{}`, which the instruction does not contain",
            action.name
          ),
          0.75,
        ));
      }

      // The right value was never available to the agent.
      let expected_terms = scalar_terms(expected);
      if !expected_terms.is_empty()
        && expected_terms.iter().all(|term| !seen.contains(term.as_str()))
      {
        return Some(Judgment::new(
          Fault::User,
          format!(
            "`{key}` for `{}` was never provided before the agent needed it",
            action.name
          ),
          0.65,
        ));
      }
    }
  }

  if stopped_while_agent_asked(task, trajectory) {
    return Some(Judgment::new(
      Fault::User,
      "user ended the conversation while the agent was still gathering information",
      0.6,
    ));
  }
  None
}

fn agent_fault(task: &Task, trajectory: &Trajectory, progress: &GoalProgress) -> Judgment {
  let catalog = task.catalog();

  if let Some(transfer) = detect_transfer(task, trajectory)
    && transfer.premature
  {
    return Judgment::new(
      Fault::agent(FaultType::CalledWrongTool),
      format!("agent handed off to a human at turn {} without cause", transfer.turn_index),
      0.85,
    );
  }
  if let Some((_, call)) = trajectory.tool_calls().find(|(_, call)| {
    call.outcome.is_success() && catalog.is_mutating(&call.name) && !task.expects_tool(&call.name)
  }) {
    return Judgment::new(
      Fault::agent(FaultType::CalledWrongTool),
      format!("agent called `{}`, which the task does not require", call.name),
      0.85,
    );
  }

  let wrong = progress.wrong_arguments(task);
  if let Some((_, action)) = wrong.first() {
    return Judgment::new(
      Fault::agent(FaultType::UsedWrongToolArgument),
      format!("agent called `{}` with wrong arguments", action.name),
      0.8,
    );
  }
  if let Some(&turn_index) = progress.extraneous.first() {
    return Judgment::new(
      Fault::agent(FaultType::UsedWrongToolArgument),
      format!("agent repeated a required call with different arguments at turn {turn_index}"),
      0.75,
    );
  }

  if trajectory.is_empty() {
    return Judgment::new(
      Fault::agent(FaultType::TimeoutOrApiError),
      "trajectory is empty",
      0.9,
    );
  }
  if trajectory.termination.side() == TerminationSide::Agent {
    return Judgment::new(
      Fault::agent(FaultType::TimeoutOrApiError),
      trajectory.termination.describe(),
      0.9,
    );
  }

  let partial_state = match (&task.target_state, &trajectory.final_state) {
    (Some(target), Some(actual)) => {
      let ratio = tauplus_trajectory::state_match_ratio(target, actual);
      ratio > 0.0 && ratio < 1.0
    }
    _ => false,
  };
  if progress.ratio().is_some_and(|r| r > 0.0) || partial_state {
    let missing = progress.missing(task);
    let description = if missing.is_empty() {
      "agent completed only part of the goal".to_string()
    } else {
      format!("agent never performed: {}", missing.join(", "))
    };
    return Judgment::new(Fault::agent(FaultType::GoalPartiallyCompleted), description, 0.7);
  }

  Judgment::new(
    Fault::agent(FaultType::Other),
    "no specific agent mistake identified",
    0.5,
  )
}

/// Lower-cased text of messages before `turn_index` whose role passes `keep`.
fn said_before(trajectory: &Trajectory, turn_index: usize, keep: impl Fn(Role) -> bool) -> String {
  trajectory
    .messages()
    .take_while(|(i, _)| *i < turn_index)
    .filter(|(_, m)| keep(m.role))
    .map(|(_, m)| m.content.to_lowercase())
    .collect::<Vec<_>>()
    .join("\n")
}

/// Everything the agent could have read before `turn_index`: user messages
/// and tool outputs.
fn seen_before(trajectory: &Trajectory, turn_index: usize) -> String {
  let mut seen = said_before(trajectory, turn_index, |role| role == Role::User);
  for (i, call) in trajectory.tool_calls() {
    if i >= turn_index {
      break;
    }
    seen.push('\n');
    seen.push_str(&call.outcome.text().to_lowercase());
  }
  seen
}

/// Lower-cased string and number leaves of an argument value.
fn scalar_terms(value: &Value) -> Vec<String> {
  match value {
    Value::String(s) if !s.trim().is_empty() => vec![s.to_lowercase()],
    Value::Number(n) => vec![n.to_string()],
    Value::Array(items) => items.iter().flat_map(scalar_terms).collect(),
    Value::Object(map) => map.values().flat_map(scalar_terms).collect(),
    _ => Vec::new(),
  }
}

fn stopped_while_agent_asked(task: &Task, trajectory: &Trajectory) -> bool {
  if trajectory.termination != Termination::UserStopped
    || task.mutating_actions().next().is_none()
  {
    return false;
  }
  let catalog = task.catalog();
  let acted = trajectory
    .tool_calls()
    .any(|(_, c)| c.outcome.is_success() && catalog.is_mutating(&c.name));
  if acted {
    return false;
  }
  trajectory
    .agent_messages()
    .last()
    .is_some_and(|(_, m)| m.content.trim_end().ends_with('?'))
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tauplus_config::Domain;
  use tauplus_trajectory::testing::{TrajectoryBuilder, args};
  use tauplus_trajectory::{Action, ToolFailureKind};

  use super::*;

  fn task() -> Task {
    Task {
      task_id: "3".to_string(),
      domain: Domain::Retail,
      instruction: "You are Yusuf. Cancel order #W2378156 because you no longer need it.".to_string(),
      actions: vec![Action::new(
        "cancel_pending_order",
        args(json!({"order_id": "#W2378156", "reason": "no longer needed"})),
      )],
      outputs: vec![],
      policies: vec![],
      initial_state: None,
      target_state: None,
    }
  }

  #[test]
  fn environment_termination_blames_environment() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("cancel please")
      .termination(Termination::EnvironmentError {
        message: "db down".to_string(),
      })
      .build();
    assert_eq!(RuleBasedJudge.decide(&task(), &trajectory).fault, Fault::Environment);
  }

  #[test]
  fn failed_required_call_blames_environment() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("cancel #W2378156, no longer needed")
      .tool_err(
        "cancel_pending_order",
        json!({"order_id": "#W2378156", "reason": "no longer needed"}),
        ToolFailureKind::Backend,
      )
      .build();
    assert_eq!(RuleBasedJudge.decide(&task(), &trajectory).fault, Fault::Environment);
  }

  #[test]
  fn invented_user_value_blames_user() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("cancel order #W9999999, no longer needed")
      .tool_ok(
        "cancel_pending_order",
        json!({"order_id": "#W9999999", "reason": "no longer needed"}),
        json!({"status": "cancelled"}),
      )
      .build();
    let judgment = RuleBasedJudge.decide(&task(), &trajectory);
    assert_eq!(judgment.fault, Fault::User);
    assert!(judgment.description.contains("#w9999999"));
  }

  #[test]
  fn agent_typo_is_wrong_argument() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("cancel order #W2378156, no longer needed")
      .tool_ok(
        "cancel_pending_order",
        json!({"order_id": "#W2378165", "reason": "no longer needed"}),
        json!({"status": "cancelled"}),
      )
      .build();
    assert_eq!(
      RuleBasedJudge.decide(&task(), &trajectory).fault,
      Fault::agent(FaultType::UsedWrongToolArgument)
    );
  }

  #[test]
  fn unrequired_mutation_is_wrong_tool() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("cancel order #W2378156")
      .tool_ok(
        "return_delivered_order_items",
        json!({"order_id": "#W2378156"}),
        json!({}),
      )
      .build();
    assert_eq!(
      RuleBasedJudge.decide(&task(), &trajectory).fault,
      Fault::agent(FaultType::CalledWrongTool)
    );
  }

  #[test]
  fn empty_trajectory_is_timeout_or_api_error() {
    let trajectory = TrajectoryBuilder::new("3")
      .termination(Termination::MaxSteps)
      .build();
    assert_eq!(
      RuleBasedJudge.decide(&task(), &trajectory).fault,
      Fault::agent(FaultType::TimeoutOrApiError)
    );
  }

  #[test]
  fn stopping_on_a_question_blames_user() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("I want to cancel something")
      .agent("Which order would you like to cancel?")
      .build();
    assert_eq!(RuleBasedJudge.decide(&task(), &trajectory).fault, Fault::User);
  }

  #[test]
  fn residual_is_other() {
    let trajectory = TrajectoryBuilder::new("3")
      .user("cancel order #W2378156")
      .agent("Done.")
      .build();
    assert_eq!(
      RuleBasedJudge.decide(&task(), &trajectory).fault,
      Fault::agent(FaultType::Other)
    );
  }
}
