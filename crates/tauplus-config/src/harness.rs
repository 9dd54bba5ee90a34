use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::ConfigError;
use crate::judge::JudgeConfig;
use crate::scoring::{EfficiencyBands, ScoringWeights};

/// Automatic retry policy for tool invocations.
///
/// Only idempotent calls are ever retried, and at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
  pub idempotent_only: bool,
  pub max_retries: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      idempotent_only: true,
      max_retries: 1,
    }
  }
}

impl RetryPolicy {
  pub const NONE: RetryPolicy = RetryPolicy {
    idempotent_only: true,
    max_retries: 0,
  };

  /// Retries allowed for a call with the given idempotency.
  pub fn retries_for(&self, idempotent: bool) -> u32 {
    if idempotent { self.max_retries } else { 0 }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !self.idempotent_only {
      return Err(ConfigError::InvalidRetry(
        "non-idempotent calls cannot be retried automatically".to_string(),
      ));
    }
    if self.max_retries > 1 {
      return Err(ConfigError::InvalidRetry(format!(
        "max_retries is {}, at most 1 is allowed",
        self.max_retries
      )));
    }
    Ok(())
  }
}

/// Top-level harness configuration.
///
/// Loaded from a JSON file; every field except `domain` has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
  pub domain: Domain,

  /// Maximum number of attempts in flight at once.
  #[serde(default = "default_concurrency")]
  pub concurrency_limit: usize,

  /// Timeout applied to every external call (agent, user, tool, judge).
  #[serde(default = "default_call_timeout")]
  pub call_timeout_secs: f64,

  /// Agent steps before an attempt is cut off.
  #[serde(default = "default_max_steps")]
  pub max_steps: u32,

  #[serde(default)]
  pub weights: ScoringWeights,

  #[serde(default)]
  pub efficiency: EfficiencyBands,

  #[serde(default)]
  pub retry: RetryPolicy,

  #[serde(default)]
  pub judge: JudgeConfig,

  /// Run the error classifier on successful attempts as well.
  #[serde(default)]
  pub classify_successes: bool,
}

fn default_concurrency() -> usize {
  1
}

fn default_call_timeout() -> f64 {
  60.0
}

fn default_max_steps() -> u32 {
  30
}

impl HarnessConfig {
  /// Default configuration for a domain.
  pub fn for_domain(domain: Domain) -> Self {
    Self {
      domain,
      concurrency_limit: default_concurrency(),
      call_timeout_secs: default_call_timeout(),
      max_steps: default_max_steps(),
      weights: ScoringWeights::default(),
      efficiency: EfficiencyBands::default(),
      retry: RetryPolicy::default(),
      judge: JudgeConfig::default(),
      classify_successes: false,
    }
  }

  /// Parse and validate a configuration from JSON text.
  pub fn from_json(json: &str) -> Result<Self, ConfigError> {
    let config: HarnessConfig = match serde_json::from_str(json) {
      Ok(config) => config,
      // serde flattens our domain error into its own message; surface the
      // dedicated variant instead.
      Err(e) => return Err(unknown_domain_from(&e).unwrap_or(ConfigError::Parse(e))),
    };
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;
    Self::from_json(&json)
  }

  pub fn call_timeout(&self) -> Duration {
    seconds(self.call_timeout_secs)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.concurrency_limit == 0 {
      return Err(ConfigError::InvalidValue {
        field: "concurrency_limit",
        message: "must be a positive integer".to_string(),
      });
    }
    if !is_positive_duration(self.call_timeout_secs) {
      return Err(ConfigError::InvalidValue {
        field: "call_timeout_secs",
        message: format!("{} is not a positive duration", self.call_timeout_secs),
      });
    }
    if self.max_steps == 0 {
      return Err(ConfigError::InvalidValue {
        field: "max_steps",
        message: "must be a positive integer".to_string(),
      });
    }
    self.weights.validate()?;
    self.efficiency.validate()?;
    self.retry.validate()?;
    self.judge.validate()?;
    Ok(())
  }
}

/// Positive and representable as a [`Duration`].
pub(crate) fn is_positive_duration(secs: f64) -> bool {
  secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

/// Saturates instead of panicking on values that failed validation.
pub(crate) fn seconds(secs: f64) -> Duration {
  Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn unknown_domain_from(err: &serde_json::Error) -> Option<ConfigError> {
  let message = err.to_string();
  let rest = message.strip_prefix("unknown domain: ")?;
  let name = rest.split(" at line").next().unwrap_or(rest);
  Some(ConfigError::UnknownDomain(name.to_string()))
}
