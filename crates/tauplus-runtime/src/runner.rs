use std::sync::Arc;

use tauplus_config::HarnessConfig;
use tauplus_eval::{AttemptRecord, AttemptStatus, Evaluator};
use tauplus_trajectory::{Task, Trajectory};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backend::BackendFactory;
use crate::error::RuntimeError;
use crate::events::{NoopNotifier, SuiteEvent, SuiteNotifier};
use crate::executor::AttemptExecutor;

/// Runs every (task, trial) pair of a suite as independent tokio tasks,
/// at most `concurrency_limit` at a time, and evaluates each trajectory.
#[derive(Clone)]
pub struct SuiteRunner {
  executor: Arc<AttemptExecutor>,
  evaluator: Arc<Evaluator>,
  factory: Arc<dyn BackendFactory>,
  notifier: Arc<dyn SuiteNotifier>,
  semaphore: Arc<Semaphore>,
}

impl SuiteRunner {
  pub fn new(
    config: &HarnessConfig,
    factory: Arc<dyn BackendFactory>,
    evaluator: Arc<Evaluator>,
  ) -> Self {
    Self {
      executor: Arc::new(AttemptExecutor::from_config(config)),
      evaluator,
      factory,
      notifier: Arc::new(NoopNotifier),
      semaphore: Arc::new(Semaphore::new(config.concurrency_limit.max(1))),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn SuiteNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Run `trials` attempts of every task.
  ///
  /// Records come back task by task, trials in order. Attempts still waiting
  /// for a slot when `cancel` fires are recorded as cancelled without
  /// running.
  #[instrument(
    name = "run_suite",
    skip_all,
    fields(run_id = %run_id, tasks = tasks.len(), trials = trials)
  )]
  pub async fn run(
    &self,
    run_id: Uuid,
    tasks: &[Task],
    trials: u32,
    cancel: &CancellationToken,
  ) -> Vec<AttemptRecord> {
    let attempts: Vec<(Arc<Task>, u32)> = tasks
      .iter()
      .flat_map(|task| {
        let task = Arc::new(task.clone());
        (0..trials).map(move |trial| (task.clone(), trial))
      })
      .collect();

    self.notifier.notify(SuiteEvent::SuiteStarted {
      run_id,
      attempts: attempts.len(),
    });

    let keys: Vec<(String, u32)> = attempts
      .iter()
      .map(|(task, trial)| (task.task_id.clone(), *trial))
      .collect();

    let handles: Vec<_> = attempts
      .into_iter()
      .map(|(task, trial)| {
        let runner = self.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.run_attempt(run_id, &task, trial, &cancel).await })
      })
      .collect();

    let results = futures::future::join_all(handles).await;
    let domain = self.evaluator.domain();

    let records: Vec<AttemptRecord> = results
      .into_iter()
      .zip(keys)
      .map(|(result, (task_id, trial))| {
        result.unwrap_or_else(|e| {
          error!(task_id = %task_id, trial, error = %e, "attempt_task_failed");
          let reason = format!("attempt task failed: {e}");
          AttemptRecord::invalid(run_id, &task_id, domain, trial, reason)
        })
      })
      .collect();

    self.notifier.notify(SuiteEvent::SuiteCompleted {
      run_id,
      records: records.len(),
    });
    info!(records = records.len(), "suite_finished");
    records
  }

  async fn run_attempt(
    &self,
    run_id: Uuid,
    task: &Task,
    trial: u32,
    cancel: &CancellationToken,
  ) -> AttemptRecord {
    let task_id = task.task_id.clone();

    let permit = tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      permit = self.semaphore.clone().acquire_owned() => permit.ok(),
    };
    let Some(_permit) = permit else {
      self.notifier.notify(SuiteEvent::AttemptCancelled {
        run_id,
        task_id: task_id.clone(),
        trial,
      });
      return AttemptRecord::not_started(run_id, &task_id, task.domain, trial);
    };

    self.notifier.notify(SuiteEvent::AttemptStarted {
      run_id,
      task_id: task_id.clone(),
      trial,
    });

    let record = match self.execute(task, trial, cancel).await {
      Ok(trajectory) => self.evaluator.evaluate(run_id, task, &trajectory).await,
      Err(e) => {
        warn!(task_id = %task_id, trial, error = %e, "attempt_invalid");
        AttemptRecord::invalid(run_id, &task_id, task.domain, trial, e.to_string())
      }
    };

    let event = match record.status {
      AttemptStatus::Completed => SuiteEvent::AttemptCompleted {
        run_id,
        task_id,
        trial,
        success: record.success,
      },
      AttemptStatus::Cancelled => SuiteEvent::AttemptCancelled {
        run_id,
        task_id,
        trial,
      },
      AttemptStatus::Invalid => SuiteEvent::AttemptFailed {
        run_id,
        task_id,
        trial,
        error: record.invalid_reason.clone().unwrap_or_default(),
      },
    };
    self.notifier.notify(event);
    record
  }

  async fn execute(
    &self,
    task: &Task,
    trial: u32,
    cancel: &CancellationToken,
  ) -> Result<Trajectory, RuntimeError> {
    let session = self
      .factory
      .session(task, trial)
      .await
      .map_err(|source| RuntimeError::Session {
        task_id: task.task_id.clone(),
        trial,
        source,
      })?;
    self.executor.run(task, trial, &session, cancel).await
  }
}
