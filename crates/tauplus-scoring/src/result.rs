use serde::{Deserialize, Serialize};
use tauplus_config::ScoringWeights;
use thiserror::Error;

/// Allowed drift between a stored composite and its recomputation.
pub const COMPOSITE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
  #[error("score `{field}` must lie in [0, 1], got {value}")]
  OutOfRange { field: &'static str, value: f64 },

  #[error("composite {stored} does not match weighted sum {computed}")]
  InconsistentComposite { stored: f64, computed: f64 },

  #[error("invalid weights: {0}")]
  Weights(String),
}

/// The four sub-scores before they are combined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubScores {
  pub task_completion: f64,
  pub efficiency: f64,
  pub policy_adherence: f64,
  pub user_satisfaction: f64,
}

/// Sub-scores together with the weights and composite derived from them.
///
/// The composite is never set directly: it is computed on construction, and
/// deserialization recomputes it and rejects records where it disagrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawScore")]
pub struct ScoreResult {
  task_completion: f64,
  efficiency: f64,
  policy_adherence: f64,
  user_satisfaction: f64,
  composite: f64,
  weights: ScoringWeights,
}

impl ScoreResult {
  /// Clamp each sub-score into [0, 1] and derive the composite.
  pub fn new(weights: ScoringWeights, scores: SubScores) -> Self {
    let task_completion = clamp_unit(scores.task_completion);
    let efficiency = clamp_unit(scores.efficiency);
    let policy_adherence = clamp_unit(scores.policy_adherence);
    let user_satisfaction = clamp_unit(scores.user_satisfaction);
    let composite = clamp_unit(weights.combine(
      task_completion,
      efficiency,
      policy_adherence,
      user_satisfaction,
    ));

    Self {
      task_completion,
      efficiency,
      policy_adherence,
      user_satisfaction,
      composite,
      weights,
    }
  }

  pub fn task_completion(&self) -> f64 {
    self.task_completion
  }

  pub fn efficiency(&self) -> f64 {
    self.efficiency
  }

  pub fn policy_adherence(&self) -> f64 {
    self.policy_adherence
  }

  pub fn user_satisfaction(&self) -> f64 {
    self.user_satisfaction
  }

  pub fn composite(&self) -> f64 {
    self.composite
  }

  pub fn weights(&self) -> ScoringWeights {
    self.weights
  }

  pub fn sub_scores(&self) -> SubScores {
    SubScores {
      task_completion: self.task_completion,
      efficiency: self.efficiency,
      policy_adherence: self.policy_adherence,
      user_satisfaction: self.user_satisfaction,
    }
  }
}

/// NaN maps to 0 so a broken heuristic cannot poison the composite.
fn clamp_unit(value: f64) -> f64 {
  if value.is_nan() {
    0.0
  } else {
    value.clamp(0.0, 1.0)
  }
}

#[derive(Deserialize)]
struct RawScore {
  task_completion: f64,
  efficiency: f64,
  policy_adherence: f64,
  user_satisfaction: f64,
  composite: f64,
  weights: ScoringWeights,
}

impl TryFrom<RawScore> for ScoreResult {
  type Error = ScoreError;

  fn try_from(raw: RawScore) -> Result<Self, Self::Error> {
    raw
      .weights
      .validate()
      .map_err(|e| ScoreError::Weights(e.to_string()))?;

    for (field, value) in [
      ("task_completion", raw.task_completion),
      ("efficiency", raw.efficiency),
      ("policy_adherence", raw.policy_adherence),
      ("user_satisfaction", raw.user_satisfaction),
      ("composite", raw.composite),
    ] {
      if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
        return Err(ScoreError::OutOfRange { field, value });
      }
    }

    let computed = raw.weights.combine(
      raw.task_completion,
      raw.efficiency,
      raw.policy_adherence,
      raw.user_satisfaction,
    );
    if (computed - raw.composite).abs() > COMPOSITE_TOLERANCE {
      return Err(ScoreError::InconsistentComposite {
        stored: raw.composite,
        computed,
      });
    }

    Ok(Self {
      task_completion: raw.task_completion,
      efficiency: raw.efficiency,
      policy_adherence: raw.policy_adherence,
      user_satisfaction: raw.user_satisfaction,
      composite: raw.composite,
      weights: raw.weights,
    })
  }
}
