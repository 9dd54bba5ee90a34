use thiserror::Error;

/// Errors raised by a fault judge.
///
/// None of these are fatal: the attributor turns every one of them into an
/// unattributed result.
#[derive(Debug, Error)]
pub enum JudgeError {
  #[error("environment variable {var} holding the judge API key is not set")]
  MissingApiKey { var: String },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("judge endpoint returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("malformed judge response: {0}")]
  MalformedResponse(String),

  #[error("{stage} option {option} is out of range")]
  InvalidOption { stage: &'static str, option: u64 },

  #[error("prompt rendering failed: {0}")]
  Template(#[from] minijinja::Error),

  #[error("judge timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },
}
