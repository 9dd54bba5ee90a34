//! Conversion of recorded runs in the tau-bench results format.
//!
//! A results file is a JSON array of runs:
//!
//! ```json
//! [{
//!   "task_id": 12,
//!   "trial": 0,
//!   "reward": 1.0,
//!   "info": { "error": null },
//!   "traj": [
//!     { "role": "system", "content": "..." },
//!     { "role": "user", "content": "I want to cancel order #W1" },
//!     { "role": "assistant", "content": null, "tool_calls": [
//!       { "id": "call_1", "function": { "name": "cancel_pending_order", "arguments": "{\"order_id\": \"#W1\"}" } }
//!     ] },
//!     { "role": "tool", "tool_call_id": "call_1", "name": "cancel_pending_order", "content": "{...}" }
//!   ]
//! }]
//! ```
//!
//! Tool results beginning with `Error` are recorded as failed calls.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::TrajectoryError;
use crate::recorder::{Closing, Resolution, TrajectoryRecorder};
use crate::task::Task;
use crate::trajectory::{Termination, Trajectory};
use crate::turn::{Role, ToolFailureKind, ToolOutcome};

const STOP_MARKER: &str = "###STOP###";

#[derive(Debug, Clone, Deserialize)]
pub struct RecordedRun {
  pub task_id: Value,
  #[serde(default)]
  pub trial: u32,
  #[serde(default)]
  pub reward: Option<f64>,
  #[serde(default)]
  pub info: Value,
  #[serde(default)]
  pub traj: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
  pub role: String,
  #[serde(default)]
  pub content: Option<String>,
  #[serde(default)]
  pub tool_calls: Option<Vec<ChatToolCall>>,
  #[serde(default)]
  pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatToolCall {
  pub id: String,
  pub function: ChatFunction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatFunction {
  pub name: String,
  /// JSON-encoded argument object.
  pub arguments: String,
}

impl RecordedRun {
  /// Task id as a string, whether recorded as a number or a string.
  pub fn task_key(&self) -> String {
    match &self.task_id {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    }
  }

  pub fn error(&self) -> Option<String> {
    match self.info.get("error")? {
      Value::Null => None,
      Value::String(s) => Some(s.clone()),
      other => Some(other.to_string()),
    }
  }

  /// Rebuild a closed trajectory for `task`.
  pub fn into_trajectory(self, task: &Task) -> Result<Trajectory, TrajectoryError> {
    let mut recorder = TrajectoryRecorder::replay(self.task_key(), self.trial, task.catalog());
    let error = self.error();
    let mut last_user: Option<String> = None;
    let mut last_tool: Option<String> = None;

    for message in &self.traj {
      let content = message.content.clone().unwrap_or_default();
      match message.role.as_str() {
        "system" => recorder.record_message(Role::System, content, None),
        "user" => {
          last_user = Some(content.clone());
          last_tool = None;
          recorder.record_message(Role::User, content, None);
        }
        "assistant" => {
          if !content.is_empty() {
            recorder.record_message(Role::Agent, content, None);
          }
          for call in message.tool_calls.iter().flatten() {
            let arguments = parse_arguments(&call.function.arguments)?;
            recorder.begin_tool_call(Some(call.id.clone()), &call.function.name, arguments)?;
            last_tool = Some(call.function.name.clone());
          }
        }
        "tool" => {
          let call_id = message
            .tool_call_id
            .as_deref()
            .ok_or_else(|| {
              TrajectoryError::malformed("tool_call_id", "tool message without call id")
            })?;
          let handle = recorder
            .pending_handle(call_id)
            .ok_or_else(|| TrajectoryError::UnknownCall {
              call_id: call_id.to_string(),
            })?;
          recorder.resolve_tool_call(handle, Resolution::new(tool_outcome(&content)))?;
        }
        other => {
          return Err(TrajectoryError::malformed(
            "role",
            format!("unsupported message role `{other}`"),
          ));
        }
      }
    }

    let termination = if let Some(message) = error {
      Termination::AgentError { message }
    } else if last_tool.is_some_and(|tool| task.catalog().is_transfer(&tool)) {
      Termination::Transferred
    } else if last_user.is_some_and(|u| u.contains(STOP_MARKER)) {
      Termination::UserStopped
    } else {
      Termination::MaxSteps
    };

    recorder.close(Closing {
      reward: self.reward,
      ..Closing::new(termination)
    })
  }
}

/// Parse a results file.
pub fn parse_recorded_runs(json: &str) -> Result<Vec<RecordedRun>, TrajectoryError> {
  Ok(serde_json::from_str(json)?)
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, TrajectoryError> {
  if raw.trim().is_empty() {
    return Ok(Map::new());
  }
  match serde_json::from_str(raw) {
    Ok(Value::Object(map)) => Ok(map),
    Ok(other) => Err(TrajectoryError::malformed(
      "tool_calls.arguments",
      format!("expected an object, got {other}"),
    )),
    Err(e) => Err(TrajectoryError::malformed(
      "tool_calls.arguments",
      e.to_string(),
    )),
  }
}

fn tool_outcome(content: &str) -> ToolOutcome {
  if let Some(rest) = content.strip_prefix("Error") {
    return ToolOutcome::Failure {
      kind: ToolFailureKind::InvalidArguments,
      message: rest.trim_start_matches(':').trim().to_string(),
    };
  }
  let output = serde_json::from_str(content).unwrap_or_else(|_| Value::String(content.to_string()));
  ToolOutcome::Success { output }
}
