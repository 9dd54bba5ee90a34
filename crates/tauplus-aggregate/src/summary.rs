use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tauplus_attribution::{Attribution, FaultAuthor, FaultType};
use tauplus_classifier::{ErrorCategory, ErrorFamily, Severity};
use tauplus_config::Domain;
use tauplus_eval::{AttemptRecord, AttemptStatus};
use tauplus_trajectory::Termination;

use crate::estimator::{pass_at, pass_hat};

/// An estimator value at one `k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassK {
  pub k: usize,
  pub value: f64,
}

/// Suite statistics: a pure fold over attempt records.
///
/// Invalid attempts are excluded from every rate and mean and counted in
/// `excluded_attempts`; cancelled attempts likewise in `cancelled_attempts`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SuiteSummary {
  pub total_attempts: usize,
  pub excluded_attempts: usize,
  pub cancelled_attempts: usize,
  pub evaluated_attempts: usize,
  pub successes: usize,
  /// Distinct tasks among evaluated attempts.
  pub tasks: usize,
  pub success_rate: f64,
  pub pass_hat_k: Vec<PassK>,
  pub pass_at_k: Vec<PassK>,

  pub mean_composite: f64,
  pub mean_task_completion: f64,
  pub mean_efficiency: f64,
  pub mean_policy_adherence: f64,
  pub mean_user_satisfaction: f64,
  /// Attempts with a premature transfer or a hand-off to a human.
  pub transfer_rate: f64,

  pub total_errors: usize,
  pub mean_errors_per_attempt: f64,
  pub mean_errors_per_task: f64,
  pub errors_by_category: BTreeMap<ErrorCategory, usize>,
  pub errors_by_family: BTreeMap<ErrorFamily, usize>,
  pub errors_by_severity: BTreeMap<Severity, usize>,

  pub faults_by_author: BTreeMap<FaultAuthor, usize>,
  pub faults_by_type: BTreeMap<FaultType, usize>,
  pub unattributed: usize,
  pub advisory_faults: usize,

  /// Evaluated records whose tokens or timings were estimated.
  pub estimated_records: usize,
  pub mean_turns: f64,
  pub mean_tool_calls: f64,
  pub mean_tokens: f64,
  pub mean_duration_secs: f64,
  pub tool_success_rate: f64,
}

impl SuiteSummary {
  pub fn from_records(records: &[AttemptRecord]) -> Self {
    let mut summary = SuiteSummary {
      total_attempts: records.len(),
      ..Default::default()
    };

    let evaluated: Vec<&AttemptRecord> = records
      .iter()
      .filter(|r| match r.status {
        AttemptStatus::Completed => true,
        AttemptStatus::Invalid => {
          summary.excluded_attempts += 1;
          false
        }
        AttemptStatus::Cancelled => {
          summary.cancelled_attempts += 1;
          false
        }
      })
      .collect();

    summary.evaluated_attempts = evaluated.len();
    summary.successes = evaluated.iter().filter(|r| r.success).count();
    summary.success_rate = ratio(summary.successes, summary.evaluated_attempts);

    // Ordered so the float fold does not depend on hash or input order.
    let mut per_task: BTreeMap<(Domain, &str), (usize, usize)> = BTreeMap::new();
    for record in &evaluated {
      let entry = per_task.entry((record.domain, record.task_id.as_str())).or_default();
      entry.0 += 1;
      entry.1 += usize::from(record.success);
    }
    summary.tasks = per_task.len();
    let counts: Vec<(usize, usize)> = per_task.into_values().collect();
    let max_k = counts.iter().map(|(n, _)| *n).min().unwrap_or(0);
    summary.pass_hat_k = estimate(&counts, max_k, pass_hat);
    summary.pass_at_k = estimate(&counts, max_k, pass_at);

    let scores: Vec<_> = evaluated.iter().filter_map(|r| r.score).collect();
    summary.mean_composite = mean(scores.iter().map(|s| s.composite()));
    summary.mean_task_completion = mean(scores.iter().map(|s| s.task_completion()));
    summary.mean_efficiency = mean(scores.iter().map(|s| s.efficiency()));
    summary.mean_policy_adherence = mean(scores.iter().map(|s| s.policy_adherence()));
    summary.mean_user_satisfaction = mean(scores.iter().map(|s| s.user_satisfaction()));

    let transfers = evaluated
      .iter()
      .filter(|r| r.transfer.is_some() || r.termination == Some(Termination::Transferred))
      .count();
    summary.transfer_rate = ratio(transfers, summary.evaluated_attempts);

    for record in &evaluated {
      for error in &record.errors {
        summary.total_errors += 1;
        *summary.errors_by_category.entry(error.category).or_default() += 1;
        *summary.errors_by_family.entry(error.family()).or_default() += 1;
        *summary.errors_by_severity.entry(error.severity).or_default() += 1;
      }

      match &record.fault {
        Some(Attribution::Assigned(assignment)) => {
          *summary.faults_by_author.entry(assignment.fault.author()).or_default() += 1;
          if let Some(fault_type) = assignment.fault.fault_type() {
            *summary.faults_by_type.entry(fault_type).or_default() += 1;
          }
          summary.advisory_faults += usize::from(assignment.advisory);
        }
        Some(Attribution::Unattributed { .. }) => summary.unattributed += 1,
        None => {}
      }
    }
    summary.mean_errors_per_attempt = ratio(summary.total_errors, summary.evaluated_attempts);
    summary.mean_errors_per_task = ratio(summary.total_errors, summary.tasks);

    summary.estimated_records = evaluated.iter().filter(|r| r.estimated).count();
    summary.mean_turns = mean(evaluated.iter().map(|r| r.turn_count as f64));
    summary.mean_tool_calls = mean(evaluated.iter().map(|r| r.tool_call_count as f64));
    summary.mean_tokens = mean(evaluated.iter().map(|r| r.token_usage.total as f64));
    summary.mean_duration_secs = mean(evaluated.iter().map(|r| r.duration_secs));

    let calls: u64 = evaluated.iter().map(|r| r.tool_call_count as u64).sum();
    let succeeded: u64 = evaluated.iter().map(|r| r.successful_tool_calls as u64).sum();
    summary.tool_success_rate = if calls == 0 {
      1.0
    } else {
      succeeded as f64 / calls as f64
    };

    summary
  }

  pub fn pass_hat(&self, k: usize) -> Option<f64> {
    self.pass_hat_k.iter().find(|p| p.k == k).map(|p| p.value)
  }

  pub fn pass_at(&self, k: usize) -> Option<f64> {
    self.pass_at_k.iter().find(|p| p.k == k).map(|p| p.value)
  }

  /// Share of errors per category in percent, for display.
  pub fn category_percentages(&self) -> BTreeMap<ErrorCategory, f64> {
    self
      .errors_by_category
      .iter()
      .map(|(category, count)| (*category, percentage(*count, self.total_errors)))
      .collect()
  }

  /// Share of attributed faults per author in percent, for display.
  pub fn author_percentages(&self) -> BTreeMap<FaultAuthor, f64> {
    let attributed: usize = self.faults_by_author.values().sum();
    self
      .faults_by_author
      .iter()
      .map(|(author, count)| (*author, percentage(*count, attributed)))
      .collect()
  }
}

/// `count` as a percentage of `total`, zero when `total` is zero. Derived
/// from raw counts on demand and never stored.
pub fn percentage(count: usize, total: usize) -> f64 {
  ratio(count, total) * 100.0
}

fn ratio(count: usize, total: usize) -> f64 {
  if total == 0 {
    0.0
  } else {
    count as f64 / total as f64
  }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
  let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
  if count == 0 { 0.0 } else { sum / count as f64 }
}

fn estimate(
  counts: &[(usize, usize)],
  max_k: usize,
  f: fn(usize, usize, usize) -> Option<f64>,
) -> Vec<PassK> {
  (1..=max_k)
    .map(|k| PassK {
      k,
      value: mean(counts.iter().filter_map(|&(n, c)| f(n, c, k))),
    })
    .collect()
}
