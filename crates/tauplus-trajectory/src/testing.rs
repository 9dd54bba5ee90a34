//! Builders for hand-written trajectories in tests.

use serde_json::{Map, Value};

use crate::trajectory::{Termination, Trajectory, UserSignal};
use crate::turn::{Message, Role, ToolCallRecord, ToolFailureKind, ToolOutcome, Turn};

/// Convert a JSON object literal into an argument map.
///
/// Non-object values yield an empty map.
pub fn args(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}

#[derive(Debug, Clone)]
pub struct TrajectoryBuilder {
  trajectory: Trajectory,
}

impl TrajectoryBuilder {
  pub fn new(task_id: &str) -> Self {
    Self {
      trajectory: Trajectory {
        task_id: task_id.to_string(),
        trial: 0,
        turns: Vec::new(),
        termination: Termination::UserStopped,
        reward: None,
        final_state: None,
        user_signal: None,
        duration_secs: 1.0,
        estimated: false,
      },
    }
  }

  fn message(mut self, role: Role, content: &str) -> Self {
    self.trajectory.turns.push(Turn::Message(Message {
      role,
      content: content.to_string(),
      tokens: None,
    }));
    self
  }

  pub fn system(self, content: &str) -> Self {
    self.message(Role::System, content)
  }

  pub fn user(self, content: &str) -> Self {
    self.message(Role::User, content)
  }

  pub fn agent(self, content: &str) -> Self {
    self.message(Role::Agent, content)
  }

  pub fn tool(mut self, name: &str, arguments: Value, outcome: ToolOutcome, attempts: u32) -> Self {
    let call_id = format!("call-{}", self.trajectory.tool_call_count());
    self.trajectory.turns.push(Turn::ToolCall(ToolCallRecord {
      call_id,
      name: name.to_string(),
      arguments: args(arguments),
      outcome,
      duration_secs: 0.1,
      attempts,
      tokens: None,
    }));
    self
  }

  pub fn tool_ok(self, name: &str, arguments: Value, output: Value) -> Self {
    self.tool(name, arguments, ToolOutcome::Success { output }, 1)
  }

  pub fn tool_err(self, name: &str, arguments: Value, kind: ToolFailureKind) -> Self {
    let message = format!("{name} failed");
    self.tool(name, arguments, ToolOutcome::Failure { kind, message }, 1)
  }

  /// Append `count` alternating user/agent messages.
  pub fn chatter(mut self, count: usize) -> Self {
    for i in 0..count {
      self = if i % 2 == 0 {
        self.user("ok")
      } else {
        self.agent("noted")
      };
    }
    self
  }

  pub fn trial(mut self, trial: u32) -> Self {
    self.trajectory.trial = trial;
    self
  }

  pub fn termination(mut self, termination: Termination) -> Self {
    self.trajectory.termination = termination;
    self
  }

  pub fn reward(mut self, reward: f64) -> Self {
    self.trajectory.reward = Some(reward);
    self
  }

  pub fn final_state(mut self, state: Value) -> Self {
    self.trajectory.final_state = Some(state);
    self
  }

  pub fn signal(mut self, signal: UserSignal) -> Self {
    self.trajectory.user_signal = Some(signal);
    self
  }

  pub fn build(self) -> Trajectory {
    self.trajectory
  }
}
