use std::collections::HashMap;
use std::sync::Arc;

use tauplus_trajectory::{Task, Trajectory};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::evaluator::Evaluator;
use crate::record::AttemptRecord;

/// Evaluates recorded trajectories concurrently under a shared limit.
///
/// Records come back in input order. Trajectories still waiting for a
/// permit when `cancel` fires are recorded as cancelled; evaluations already
/// running finish.
#[derive(Debug, Clone)]
pub struct BatchEvaluator {
  evaluator: Arc<Evaluator>,
  semaphore: Arc<Semaphore>,
}

impl BatchEvaluator {
  pub fn new(evaluator: Arc<Evaluator>, concurrency_limit: usize) -> Self {
    Self {
      evaluator,
      semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
    }
  }

  #[instrument(
    name = "evaluate_batch",
    skip_all,
    fields(run_id = %run_id, attempts = trajectories.len())
  )]
  pub async fn evaluate_all(
    &self,
    run_id: Uuid,
    tasks: Arc<HashMap<String, Task>>,
    trajectories: Vec<Trajectory>,
    cancel: &CancellationToken,
  ) -> Vec<AttemptRecord> {
    let domain = self.evaluator.domain();
    let keys: Vec<(String, u32)> = trajectories
      .iter()
      .map(|t| (t.task_id.clone(), t.trial))
      .collect();

    let handles: Vec<_> = trajectories
      .into_iter()
      .map(|trajectory| {
        let evaluator = self.evaluator.clone();
        let semaphore = self.semaphore.clone();
        let tasks = tasks.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
          let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
          };
          let Some(_permit) = permit else {
            return AttemptRecord::cancelled(run_id, domain, &trajectory);
          };

          match tasks.get(&trajectory.task_id) {
            Some(task) => evaluator.evaluate(run_id, task, &trajectory).await,
            None => AttemptRecord::invalid(
              run_id,
              &trajectory.task_id,
              domain,
              trajectory.trial,
              format!("unknown task `{}`", trajectory.task_id),
            ),
          }
        })
      })
      .collect();

    let results = futures::future::join_all(handles).await;

    let records: Vec<AttemptRecord> = results
      .into_iter()
      .zip(keys)
      .map(|(result, (task_id, trial))| {
        result.unwrap_or_else(|e| {
          error!(task_id = %task_id, trial, error = %e, "evaluation_task_failed");
          let reason = format!("evaluation task failed: {e}");
          AttemptRecord::invalid(run_id, &task_id, domain, trial, reason)
        })
      })
      .collect();

    info!(records = records.len(), "batch_evaluated");
    records
  }
}
