use std::collections::HashSet;

use tauplus_config::EfficiencyBands;
use tauplus_trajectory::{GoalProgress, Task, Trajectory, detect_transfer};
use thiserror::Error;
use tracing::debug;

use crate::detectors::{
  AmbiguityDetector, Detector, Evidence, FlowDetector, GoalDetector, PatternDetector,
  PolicyDetector, RefusalDetector, RuntimeDetector, ToolOutcomeDetector, TransferDetector,
};
use crate::taxonomy::{ErrorCategory, ErrorRecord};

#[derive(Debug, Error)]
pub enum ClassifierError {
  #[error("invalid detector pattern: {0}")]
  Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierOptions {
  pub bands: EfficiencyBands,
  /// Also scan attempts that reached the goal.
  pub classify_successes: bool,
}

/// Runs a fixed, ordered set of detectors over a trajectory.
///
/// Output order is detector order, then turn order within a detector; at most
/// one record is kept per category and turn, except that every violated policy
/// constraint keeps its own record.
pub struct ErrorClassifier {
  options: ClassifierOptions,
  detectors: Vec<Box<dyn Detector>>,
}

impl std::fmt::Debug for ErrorClassifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let names: Vec<_> = self.detectors.iter().map(|d| d.name()).collect();
    f.debug_struct("ErrorClassifier")
      .field("options", &self.options)
      .field("detectors", &names)
      .finish()
  }
}

impl ErrorClassifier {
  /// Classifier with the standard detector set.
  pub fn new(options: ClassifierOptions) -> Result<Self, ClassifierError> {
    let detectors: Vec<Box<dyn Detector>> = vec![
      Box::new(RuntimeDetector),
      Box::new(PatternDetector::standard()?),
      Box::new(PolicyDetector),
      Box::new(RefusalDetector::new()?),
      Box::new(GoalDetector),
      Box::new(ToolOutcomeDetector),
      Box::new(TransferDetector),
      Box::new(AmbiguityDetector::new()?),
      Box::new(FlowDetector),
    ];
    Ok(Self { options, detectors })
  }

  /// Classifier with no detectors; add them with [`Self::with_detector`].
  pub fn empty(options: ClassifierOptions) -> Self {
    Self {
      options,
      detectors: Vec::new(),
    }
  }

  pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
    self.detectors.push(Box::new(detector));
    self
  }

  pub fn classify(&self, task: &Task, trajectory: &Trajectory, success: bool) -> Vec<ErrorRecord> {
    if success && !self.options.classify_successes {
      return Vec::new();
    }

    let evidence = Evidence {
      task,
      trajectory,
      success,
      progress: GoalProgress::evaluate(task, trajectory),
      transfer: detect_transfer(task, trajectory),
      bands: &self.options.bands,
    };

    let mut seen: HashSet<(ErrorCategory, Option<usize>, String)> = HashSet::new();
    let mut records = Vec::new();
    for detector in &self.detectors {
      let mut found = detector.detect(&evidence);
      found.sort_by_key(|r| r.turn_index.unwrap_or(usize::MAX));
      for record in found {
        if seen.insert((record.category, record.turn_index, record.constraint().to_string())) {
          records.push(record);
        }
      }
    }

    debug!(
      task_id = %task.task_id,
      trial = trajectory.trial,
      errors = records.len(),
      "trajectory_classified"
    );
    records
  }
}
