use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::harness::{is_positive_duration, seconds};

/// Which fault-attribution judge to use for failed attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JudgeConfig {
  /// Deterministic judge; makes no external calls.
  #[default]
  RuleBased,

  /// Chat-completions model consulted over HTTP.
  Model(ModelJudgeConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelJudgeConfig {
  /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
  pub endpoint: String,
  pub model: String,
  /// Name of the environment variable holding the API key.
  #[serde(default = "default_api_key_env")]
  pub api_key_env: String,
  #[serde(default = "default_judge_timeout")]
  pub timeout_secs: f64,
}

impl ModelJudgeConfig {
  pub fn timeout(&self) -> Duration {
    seconds(self.timeout_secs)
  }
}

fn default_api_key_env() -> String {
  "OPENAI_API_KEY".to_string()
}

fn default_judge_timeout() -> f64 {
  60.0
}

impl JudgeConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    let JudgeConfig::Model(model) = self else {
      return Ok(());
    };

    url::Url::parse(&model.endpoint).map_err(|source| ConfigError::InvalidEndpoint {
      endpoint: model.endpoint.clone(),
      source,
    })?;

    if model.model.trim().is_empty() {
      return Err(ConfigError::InvalidValue {
        field: "judge.model",
        message: "model name is empty".to_string(),
      });
    }
    if !is_positive_duration(model.timeout_secs) {
      return Err(ConfigError::InvalidValue {
        field: "judge.timeout_secs",
        message: format!("{} is not a positive duration", model.timeout_secs),
      });
    }
    Ok(())
  }
}
