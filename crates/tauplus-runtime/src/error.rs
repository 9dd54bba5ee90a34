use tauplus_trajectory::{ToolFailureKind, TrajectoryError};
use thiserror::Error;

/// Failure reported by an agent, user or tool backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
  /// The request was rejected as malformed.
  #[error("invalid arguments: {0}")]
  InvalidArguments(String),

  /// A temporary condition; repeating the request may succeed.
  #[error("transient failure: {0}")]
  Transient(String),

  #[error("backend failure: {0}")]
  Failed(String),
}

impl BackendError {
  pub fn failure_kind(&self) -> ToolFailureKind {
    match self {
      BackendError::InvalidArguments(_) => ToolFailureKind::InvalidArguments,
      BackendError::Transient(_) => ToolFailureKind::Transient,
      BackendError::Failed(_) => ToolFailureKind::Backend,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      BackendError::InvalidArguments(m) | BackendError::Transient(m) | BackendError::Failed(m) => m,
    }
  }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
  #[error("failed to open a session for task {task_id} trial {trial}")]
  Session {
    task_id: String,
    trial: u32,
    #[source]
    source: BackendError,
  },

  #[error(transparent)]
  Trajectory(#[from] TrajectoryError),
}
