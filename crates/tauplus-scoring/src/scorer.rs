use tauplus_config::{EfficiencyBands, ScoringWeights};
use tauplus_trajectory::{Task, Trajectory, detect_transfer};
use tracing::debug;

use crate::adherence::policy_adherence;
use crate::completion::task_completion;
use crate::efficiency::{EfficiencyBreakdown, efficiency};
use crate::result::{ScoreResult, SubScores};
use crate::satisfaction::user_satisfaction;

/// Computes [`ScoreResult`]s from closed trajectories.
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
  weights: ScoringWeights,
  bands: EfficiencyBands,
}

impl CompositeScorer {
  /// Weights and bands are expected to have been validated with the rest of
  /// the configuration.
  pub fn new(weights: ScoringWeights, bands: EfficiencyBands) -> Self {
    Self { weights, bands }
  }

  pub fn weights(&self) -> ScoringWeights {
    self.weights
  }

  pub fn efficiency(&self, task: &Task, trajectory: &Trajectory) -> EfficiencyBreakdown {
    let premature = detect_transfer(task, trajectory).is_some_and(|t| t.premature);
    efficiency(&self.bands, trajectory, premature)
  }

  /// Score a closed trajectory. `success` is the binary outcome, computed
  /// separately from goal-state comparison.
  pub fn score(&self, task: &Task, trajectory: &Trajectory, success: bool) -> ScoreResult {
    let scores = SubScores {
      task_completion: task_completion(task, trajectory, success),
      efficiency: self.efficiency(task, trajectory).score,
      policy_adherence: policy_adherence(task, trajectory),
      user_satisfaction: user_satisfaction(trajectory),
    };

    let result = ScoreResult::new(self.weights, scores);
    debug!(
      task_id = %task.task_id,
      trial = trajectory.trial,
      completion = result.task_completion(),
      efficiency = result.efficiency(),
      policy = result.policy_adherence(),
      satisfaction = result.user_satisfaction(),
      composite = result.composite(),
      "trajectory_scored"
    );
    result
  }
}
