use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Weights used to combine the four sub-scores into the composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringWeights {
  pub completion: f64,
  pub efficiency: f64,
  pub policy: f64,
  pub satisfaction: f64,
}

impl Default for ScoringWeights {
  fn default() -> Self {
    Self {
      completion: 0.4,
      efficiency: 0.3,
      policy: 0.2,
      satisfaction: 0.1,
    }
  }
}

impl ScoringWeights {
  /// Weighted sum of the four sub-scores, in declaration order.
  pub fn combine(&self, completion: f64, efficiency: f64, policy: f64, satisfaction: f64) -> f64 {
    self.completion * completion
      + self.efficiency * efficiency
      + self.policy * policy
      + self.satisfaction * satisfaction
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("completion", self.completion),
      ("efficiency", self.efficiency),
      ("policy", self.policy),
      ("satisfaction", self.satisfaction),
    ] {
      if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::WeightRange { name, value });
      }
    }

    let sum = self.completion + self.efficiency + self.policy + self.satisfaction;
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
      return Err(ConfigError::WeightsSum { sum });
    }
    Ok(())
  }
}

/// An optimal count range plus the count at which the score bottoms out.
///
/// Counts up to `upper` score 1.0; between `upper` and `saturation` the
/// score falls linearly to the configured floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Band {
  pub lower: u32,
  pub upper: u32,
  pub saturation: u32,
}

impl Band {
  pub const fn new(lower: u32, upper: u32, saturation: u32) -> Self {
    Self {
      lower,
      upper,
      saturation,
    }
  }

  pub fn contains(&self, count: u32) -> bool {
    (self.lower..=self.upper).contains(&count)
  }

  fn validate(&self, band: &'static str) -> Result<(), ConfigError> {
    if self.lower > self.upper {
      return Err(ConfigError::InvalidBand {
        band,
        message: format!("lower {} exceeds upper {}", self.lower, self.upper),
      });
    }
    if self.saturation <= self.upper {
      return Err(ConfigError::InvalidBand {
        band,
        message: format!(
          "saturation {} must be greater than upper {}",
          self.saturation, self.upper
        ),
      });
    }
    Ok(())
  }
}

/// Domain-calibrated efficiency bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EfficiencyBands {
  /// Conversational turns (user and agent messages).
  pub turns: Band,
  /// Tool invocations.
  pub tool_calls: Band,
  /// Score reached at and beyond a band's saturation point.
  pub floor: f64,
  /// Multiplier applied to the turn factor after a premature transfer.
  pub transfer_penalty: f64,
  /// Tool factor for a trajectory that made no tool calls at all.
  pub idle_tool_score: f64,
}

impl Default for EfficiencyBands {
  fn default() -> Self {
    Self {
      turns: Band::new(10, 30, 40),
      tool_calls: Band::new(5, 15, 30),
      floor: 0.4,
      transfer_penalty: 0.7,
      idle_tool_score: 0.5,
    }
  }
}

impl EfficiencyBands {
  pub fn validate(&self) -> Result<(), ConfigError> {
    self.turns.validate("turns")?;
    self.tool_calls.validate("tool_calls")?;

    for (field, value) in [
      ("efficiency.floor", self.floor),
      ("efficiency.transfer_penalty", self.transfer_penalty),
      ("efficiency.idle_tool_score", self.idle_tool_score),
    ] {
      if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
          field,
          message: format!("{value} is outside [0, 1]"),
        });
      }
    }
    Ok(())
  }
}
