use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ToolCatalog;
use crate::error::TrajectoryError;
use crate::estimate;
use crate::turn::{Message, Role, ToolCallRecord, Turn};

/// Who an abnormal termination is attributable to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSide {
  Agent,
  User,
  Environment,
  None,
}

/// Why an attempt stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
  /// The simulated user ended the conversation.
  UserStopped,
  /// The conversation was handed to a human agent.
  Transferred,
  /// The step budget ran out.
  MaxSteps,
  AgentTimeout,
  AgentError { message: String },
  UserTimeout,
  UserError { message: String },
  /// A required tool call failed after retries.
  RequiredToolFailed { call_id: String, tool: String },
  EnvironmentError { message: String },
  Cancelled,
}

impl Termination {
  pub fn side(&self) -> TerminationSide {
    match self {
      Termination::AgentTimeout | Termination::AgentError { .. } => TerminationSide::Agent,
      Termination::UserTimeout | Termination::UserError { .. } => TerminationSide::User,
      Termination::RequiredToolFailed { .. } | Termination::EnvironmentError { .. } => {
        TerminationSide::Environment
      }
      Termination::UserStopped
      | Termination::Transferred
      | Termination::MaxSteps
      | Termination::Cancelled => TerminationSide::None,
    }
  }

  /// The attempt ended because an external call errored or timed out.
  pub fn is_runtime_failure(&self) -> bool {
    self.side() != TerminationSide::None
  }

  pub fn describe(&self) -> String {
    match self {
      Termination::UserStopped => "user ended the conversation".to_string(),
      Termination::Transferred => "transferred to a human agent".to_string(),
      Termination::MaxSteps => "step budget exhausted".to_string(),
      Termination::AgentTimeout => "agent inference timed out".to_string(),
      Termination::AgentError { message } => format!("agent error: {message}"),
      Termination::UserTimeout => "user simulator timed out".to_string(),
      Termination::UserError { message } => format!("user simulator error: {message}"),
      Termination::RequiredToolFailed { tool, .. } => format!("required tool `{tool}` failed"),
      Termination::EnvironmentError { message } => format!("environment error: {message}"),
      Termination::Cancelled => "attempt cancelled".to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
  Positive,
  Neutral,
  Negative,
}

/// Terminal satisfaction signal reported by the simulated user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UserSignal {
  /// Rating in [0, 1].
  Rating(f64),
  Sentiment(Sentiment),
}

/// Aggregate token usage of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
  pub total: u64,
  /// At least one turn lacked a measured count.
  pub estimated: bool,
}

/// A closed, immutable record of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
  pub task_id: String,
  pub trial: u32,
  pub turns: Vec<Turn>,
  pub termination: Termination,
  /// Reward computed by the environment, when one was reported.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reward: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub final_state: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_signal: Option<UserSignal>,
  pub duration_secs: f64,
  /// Timings were substituted with estimates.
  #[serde(default)]
  pub estimated: bool,
}

impl Trajectory {
  pub fn from_json(json: &str) -> Result<Self, TrajectoryError> {
    let trajectory: Trajectory = serde_json::from_str(json)?;
    trajectory.validate()?;
    Ok(trajectory)
  }

  pub fn is_empty(&self) -> bool {
    self.turns.is_empty()
  }

  pub fn messages(&self) -> impl Iterator<Item = (usize, &Message)> {
    self
      .turns
      .iter()
      .enumerate()
      .filter_map(|(i, t)| t.as_message().map(|m| (i, m)))
  }

  pub fn tool_calls(&self) -> impl Iterator<Item = (usize, &ToolCallRecord)> {
    self
      .turns
      .iter()
      .enumerate()
      .filter_map(|(i, t)| t.as_tool_call().map(|c| (i, c)))
  }

  pub fn agent_messages(&self) -> impl Iterator<Item = (usize, &Message)> {
    self.messages().filter(|(_, m)| m.role == Role::Agent)
  }

  pub fn user_messages(&self) -> impl Iterator<Item = (usize, &Message)> {
    self.messages().filter(|(_, m)| m.role == Role::User)
  }

  /// Conversational turns: user and agent messages.
  pub fn turn_count(&self) -> u32 {
    self.messages().filter(|(_, m)| m.role != Role::System).count() as u32
  }

  pub fn tool_call_count(&self) -> u32 {
    self.tool_calls().count() as u32
  }

  pub fn successful_tool_calls(&self) -> u32 {
    self
      .tool_calls()
      .filter(|(_, c)| c.outcome.is_success())
      .count() as u32
  }

  /// Fraction of tool calls that succeeded; 1.0 when none were made.
  pub fn tool_success_rate(&self) -> f64 {
    let total = self.tool_call_count();
    if total == 0 {
      return 1.0;
    }
    self.successful_tool_calls() as f64 / total as f64
  }

  pub fn token_usage(&self) -> TokenUsage {
    let mut usage = TokenUsage::default();
    for turn in &self.turns {
      let (tokens, measured) = match turn {
        Turn::Message(m) => match m.tokens {
          Some(t) => (t, true),
          None => (estimate::message_tokens(&m.content), false),
        },
        Turn::ToolCall(c) => match c.tokens {
          Some(t) => (t, true),
          None => (estimate::tool_call_tokens(c), false),
        },
      };
      usage.total += tokens as u64;
      usage.estimated |= !measured;
    }
    usage
  }

  /// Index of the first hand-off to a human, by tool call or by agent wording.
  pub fn transfer_turn(&self, catalog: &ToolCatalog) -> Option<usize> {
    self.turns.iter().position(|turn| match turn {
      Turn::ToolCall(call) => catalog.is_transfer(&call.name),
      Turn::Message(m) if m.role == Role::Agent => {
        let content = m.content.to_lowercase();
        content.contains("transfer_to_human") || content.contains("human agent")
      }
      Turn::Message(_) => false,
    })
  }

  /// Last message sent by the simulated user.
  pub fn last_user_message(&self) -> Option<&Message> {
    self.user_messages().last().map(|(_, m)| m)
  }

  /// Reject trajectories that cannot be scored.
  pub fn validate(&self) -> Result<(), TrajectoryError> {
    if self.task_id.trim().is_empty() {
      return Err(TrajectoryError::malformed("task_id", "empty task id"));
    }
    if !(self.duration_secs.is_finite() && self.duration_secs >= 0.0) {
      return Err(TrajectoryError::malformed(
        "duration_secs",
        format!("{} is not a non-negative duration", self.duration_secs),
      ));
    }
    if let Some(reward) = self.reward
      && !(reward.is_finite() && (0.0..=1.0).contains(&reward))
    {
      return Err(TrajectoryError::malformed(
        "reward",
        format!("{reward} is outside [0, 1]"),
      ));
    }
    if let Some(UserSignal::Rating(rating)) = self.user_signal
      && !(rating.is_finite() && (0.0..=1.0).contains(&rating))
    {
      return Err(TrajectoryError::malformed(
        "user_signal",
        format!("rating {rating} is outside [0, 1]"),
      ));
    }

    let mut seen = HashSet::new();
    for (_, call) in self.tool_calls() {
      if !seen.insert(call.call_id.as_str()) {
        return Err(TrajectoryError::DuplicateCallId {
          call_id: call.call_id.clone(),
        });
      }
      if call.name.trim().is_empty() {
        return Err(TrajectoryError::malformed(
          "tool_call.name",
          format!("call {} has no tool name", call.call_id),
        ));
      }
      if call.attempts == 0 {
        return Err(TrajectoryError::malformed(
          "tool_call.attempts",
          format!("call {} was never issued", call.call_id),
        ));
      }
      if !(call.duration_secs.is_finite() && call.duration_secs >= 0.0) {
        return Err(TrajectoryError::malformed(
          "tool_call.duration_secs",
          format!("call {} has duration {}", call.call_id, call.duration_secs),
        ));
      }
    }
    Ok(())
  }
}
