use tauplus_attribution::FaultAttributor;
use tauplus_classifier::{ClassifierOptions, ErrorClassifier};
use tauplus_config::{Domain, HarnessConfig};
use tauplus_scoring::CompositeScorer;
use tauplus_trajectory::{Task, Termination, Trajectory, binary_outcome, detect_transfer};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::EvalError;
use crate::record::AttemptRecord;

/// Turns a closed trajectory into an [`AttemptRecord`].
///
/// ```text
///   trajectory ──► validate ──► binary outcome
///                                  │
///                   ┌──────────────┼──────────────┐
///                   ▼              ▼              ▼
///                scorer        classifier    attributor (failures only)
///                   └──────────────┴──────────────┘
///                                  ▼
///                            AttemptRecord
/// ```
///
/// Scoring and classification are independent of each other and of the
/// judge; a judge verdict never changes the binary outcome.
pub struct Evaluator {
  domain: Domain,
  scorer: CompositeScorer,
  classifier: ErrorClassifier,
  attributor: FaultAttributor,
}

impl std::fmt::Debug for Evaluator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Evaluator")
      .field("domain", &self.domain)
      .field("scorer", &self.scorer)
      .field("classifier", &self.classifier)
      .field("judge", &self.attributor.judge_name())
      .finish()
  }
}

impl Evaluator {
  pub fn new(
    domain: Domain,
    scorer: CompositeScorer,
    classifier: ErrorClassifier,
    attributor: FaultAttributor,
  ) -> Self {
    Self {
      domain,
      scorer,
      classifier,
      attributor,
    }
  }

  pub fn from_config(config: &HarnessConfig) -> Result<Self, EvalError> {
    config.validate()?;
    let scorer = CompositeScorer::new(config.weights, config.efficiency);
    let classifier = ErrorClassifier::new(ClassifierOptions {
      bands: config.efficiency,
      classify_successes: config.classify_successes,
    })?;
    let attributor = FaultAttributor::from_config(&config.judge, config.call_timeout())?;
    Ok(Self::new(config.domain, scorer, classifier, attributor))
  }

  pub fn domain(&self) -> Domain {
    self.domain
  }

  /// Evaluate one attempt. Never fails: malformed input yields an invalid
  /// record with the reason.
  #[instrument(
    name = "evaluate_attempt",
    skip(self, task, trajectory),
    fields(task_id = %trajectory.task_id, trial = trajectory.trial)
  )]
  pub async fn evaluate(
    &self,
    run_id: Uuid,
    task: &Task,
    trajectory: &Trajectory,
  ) -> AttemptRecord {
    if let Err(reason) = self.check(task, trajectory) {
      warn!(reason = %reason, "attempt_invalid");
      return AttemptRecord::invalid(
        run_id,
        &trajectory.task_id,
        self.domain,
        trajectory.trial,
        reason,
      );
    }

    if trajectory.termination == Termination::Cancelled {
      info!("attempt_cancelled");
      return AttemptRecord::cancelled(run_id, self.domain, trajectory);
    }

    let success = binary_outcome(task, trajectory);
    let score = self.scorer.score(task, trajectory, success);
    let errors = self.classifier.classify(task, trajectory, success);
    let fault = if success {
      None
    } else {
      Some(self.attributor.attribute(task, trajectory).await)
    };

    let mut record = AttemptRecord::completed(run_id, self.domain, trajectory);
    record.success = success;
    record.score = Some(score);
    record.errors = errors;
    record.fault = fault;
    record.transfer = detect_transfer(task, trajectory);

    info!(
      success,
      composite = score.composite(),
      errors = record.errors.len(),
      "attempt_evaluated"
    );
    record
  }

  fn check(&self, task: &Task, trajectory: &Trajectory) -> Result<(), String> {
    if task.task_id != trajectory.task_id {
      return Err(format!(
        "trajectory for task `{}` evaluated against task `{}`",
        trajectory.task_id, task.task_id
      ));
    }
    if task.domain != self.domain {
      return Err(format!(
        "task `{}` belongs to {}, the run evaluates {}",
        task.task_id, task.domain, self.domain
      ));
    }
    trajectory.validate().map_err(|e| e.to_string())
  }
}
