use std::sync::Arc;
use std::time::Duration;

use tauplus_config::JudgeConfig;
use tauplus_trajectory::{Task, Trajectory};
use tracing::{info, warn};

use crate::error::JudgeError;
use crate::judge::FaultJudge;
use crate::model::ModelJudge;
use crate::rule::RuleBasedJudge;
use crate::types::{Attribution, FaultAssignment};

/// Runs a [`FaultJudge`] under a timeout and never fails.
///
/// Any judge error or timeout becomes [`Attribution::Unattributed`]; a
/// failed attempt is never silently given a default class.
#[derive(Clone)]
pub struct FaultAttributor {
  judge: Arc<dyn FaultJudge>,
  timeout: Duration,
}

impl FaultAttributor {
  pub fn new(judge: Arc<dyn FaultJudge>, timeout: Duration) -> Self {
    Self { judge, timeout }
  }

  pub fn rule_based() -> Self {
    Self::new(Arc::new(RuleBasedJudge::new()), Duration::from_secs(5))
  }

  /// Build the judge named by configuration. `default_timeout` applies to
  /// the rule-based judge; the model judge carries its own.
  pub fn from_config(config: &JudgeConfig, default_timeout: Duration) -> Result<Self, JudgeError> {
    match config {
      JudgeConfig::RuleBased => Ok(Self::new(Arc::new(RuleBasedJudge::new()), default_timeout)),
      JudgeConfig::Model(model) => Ok(Self::new(
        Arc::new(ModelJudge::from_config(model)?),
        model.timeout(),
      )),
    }
  }

  pub fn judge_name(&self) -> &'static str {
    self.judge.name()
  }

  /// Attribute fault for a failed attempt.
  pub async fn attribute(&self, task: &Task, trajectory: &Trajectory) -> Attribution {
    let verdict = tokio::time::timeout(self.timeout, self.judge.judge(task, trajectory))
      .await
      .unwrap_or(Err(JudgeError::Timeout {
        timeout_ms: self.timeout.as_millis() as u64,
      }));

    match verdict {
      Ok(judgment) => {
        info!(
          task_id = %task.task_id,
          trial = trajectory.trial,
          judge = self.judge.name(),
          fault = %judgment.fault,
          "fault_attributed"
        );
        Attribution::Assigned(FaultAssignment {
          fault: judgment.fault,
          description: judgment.description,
          confidence: judgment.confidence,
          judge: self.judge.name().to_string(),
          advisory: self.judge.advisory(),
        })
      }
      Err(error) => {
        warn!(
          task_id = %task.task_id,
          trial = trajectory.trial,
          judge = self.judge.name(),
          error = %error,
          "fault_attribution_failed"
        );
        Attribution::Unattributed {
          reason: error.to_string(),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use tauplus_config::Domain;
  use tauplus_trajectory::testing::TrajectoryBuilder;

  use super::*;
  use crate::types::{Fault, Judgment};

  struct Slow;

  #[async_trait]
  impl FaultJudge for Slow {
    fn name(&self) -> &'static str {
      "slow"
    }

    async fn judge(&self, _: &Task, _: &Trajectory) -> Result<Judgment, JudgeError> {
      tokio::time::sleep(Duration::from_secs(10)).await;
      Ok(Judgment::new(Fault::User, "late", 1.0))
    }
  }

  struct Broken;

  #[async_trait]
  impl FaultJudge for Broken {
    fn name(&self) -> &'static str {
      "broken"
    }

    async fn judge(&self, _: &Task, _: &Trajectory) -> Result<Judgment, JudgeError> {
      Err(JudgeError::MalformedResponse("garbage".to_string()))
    }
  }

  fn task() -> Task {
    Task {
      task_id: "1".to_string(),
      domain: Domain::Retail,
      instruction: String::new(),
      actions: vec![],
      outputs: vec![],
      policies: vec![],
      initial_state: None,
      target_state: None,
    }
  }

  #[tokio::test(start_paused = true)]
  async fn timeout_degrades_to_unattributed() {
    let attributor = FaultAttributor::new(Arc::new(Slow), Duration::from_millis(50));
    let trajectory = TrajectoryBuilder::new("1").user("hi").build();
    let attribution = attributor.attribute(&task(), &trajectory).await;
    assert!(matches!(
      attribution,
      Attribution::Unattributed { ref reason } if reason.contains("timed out")
    ));
  }

  #[tokio::test]
  async fn judge_error_degrades_to_unattributed() {
    let attributor = FaultAttributor::new(Arc::new(Broken), Duration::from_secs(1));
    let trajectory = TrajectoryBuilder::new("1").user("hi").build();
    assert!(attributor.attribute(&task(), &trajectory).await.is_unattributed());
  }

  #[tokio::test]
  async fn rule_based_assignment_is_not_advisory() {
    let attributor = FaultAttributor::rule_based();
    let trajectory = TrajectoryBuilder::new("1").build();
    let attribution = attributor.attribute(&task(), &trajectory).await;
    let assignment = attribution.assignment().unwrap();
    assert_eq!(assignment.judge, "rule_based");
    assert!(!assignment.advisory);
  }
}
