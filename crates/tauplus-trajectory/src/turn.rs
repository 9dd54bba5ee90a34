use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  System,
  User,
  Agent,
}

/// A natural-language message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub role: Role,
  pub content: String,
  /// Measured token count, when the backend reported one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tokens: Option<u32>,
}

/// Why a tool invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
  /// The environment rejected the arguments (agent-side mistake).
  InvalidArguments,
  /// The call did not finish within the per-call timeout.
  Timeout,
  /// Temporary backend condition; safe to retry when idempotent.
  Transient,
  /// Backend exception independent of the caller.
  Backend,
}

impl ToolFailureKind {
  pub fn is_retryable(&self) -> bool {
    matches!(self, ToolFailureKind::Timeout | ToolFailureKind::Transient)
  }

  /// Failures the caller could not have avoided.
  pub fn is_environmental(&self) -> bool {
    !matches!(self, ToolFailureKind::InvalidArguments)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
  Success { output: Value },
  Failure { kind: ToolFailureKind, message: String },
}

impl ToolOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, ToolOutcome::Success { .. })
  }

  pub fn failure_kind(&self) -> Option<ToolFailureKind> {
    match self {
      ToolOutcome::Failure { kind, .. } => Some(*kind),
      ToolOutcome::Success { .. } => None,
    }
  }

  /// Output or error text, as shown to the agent.
  pub fn text(&self) -> String {
    match self {
      ToolOutcome::Success { output: Value::String(s) } => s.clone(),
      ToolOutcome::Success { output } => output.to_string(),
      ToolOutcome::Failure { message, .. } => format!("Error: {message}"),
    }
  }
}

/// One resolved tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
  pub call_id: String,
  pub name: String,
  #[serde(default)]
  pub arguments: Map<String, Value>,
  pub outcome: ToolOutcome,
  pub duration_secs: f64,
  /// Number of times the call was issued (1 plus retries).
  pub attempts: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tokens: Option<u32>,
}

impl ToolCallRecord {
  pub fn retried(&self) -> bool {
    self.attempts > 1
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
  Message(Message),
  ToolCall(ToolCallRecord),
}

impl Turn {
  pub fn as_message(&self) -> Option<&Message> {
    match self {
      Turn::Message(m) => Some(m),
      Turn::ToolCall(_) => None,
    }
  }

  pub fn as_tool_call(&self) -> Option<&ToolCallRecord> {
    match self {
      Turn::ToolCall(c) => Some(c),
      Turn::Message(_) => None,
    }
  }
}
