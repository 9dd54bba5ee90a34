use tauplus_attribution::JudgeError;
use tauplus_classifier::ClassifierError;
use tauplus_config::ConfigError;
use thiserror::Error;

/// Failures while assembling an evaluator. Evaluating a single attempt never
/// fails; problems there become invalid records.
#[derive(Debug, Error)]
pub enum EvalError {
  #[error("invalid configuration: {0}")]
  Config(#[from] ConfigError),

  #[error("classifier setup failed: {0}")]
  Classifier(#[from] ClassifierError),

  #[error("judge setup failed: {0}")]
  Judge(#[from] JudgeError),
}
