use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajectoryError {
  #[error("trajectory closed with unresolved tool calls: {}", call_ids.join(", "))]
  UnresolvedCalls { call_ids: Vec<String> },

  #[error("tool call already resolved: {call_id}")]
  AlreadyResolved { call_id: String },

  #[error("unknown tool call: {call_id}")]
  UnknownCall { call_id: String },

  #[error("duplicate tool call id: {call_id}")]
  DuplicateCallId { call_id: String },

  #[error("malformed trajectory field `{field}`: {message}")]
  Malformed { field: &'static str, message: String },

  #[error("failed to parse trajectory: {0}")]
  Parse(#[from] serde_json::Error),
}

impl TrajectoryError {
  pub(crate) fn malformed(field: &'static str, message: impl Into<String>) -> Self {
    TrajectoryError::Malformed {
      field,
      message: message.into(),
    }
  }
}
