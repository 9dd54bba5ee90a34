use proptest::prelude::*;
use tauplus_aggregate::{SuiteSummary, pass_hat, percentage};
use tauplus_attribution::{Attribution, Fault, FaultAssignment, FaultAuthor, FaultType};
use tauplus_classifier::{ErrorCategory, ErrorRecord, Severity};
use tauplus_config::Domain;
use tauplus_eval::{AttemptRecord, AttemptStatus};
use uuid::Uuid;

fn record(task_id: &str, trial: u32, success: bool) -> AttemptRecord {
  let mut record = AttemptRecord::invalid(Uuid::nil(), task_id, Domain::Retail, trial, "");
  record.status = AttemptStatus::Completed;
  record.invalid_reason = None;
  record.success = success;
  record
}

fn assigned(fault: Fault) -> Option<Attribution> {
  Some(Attribution::Assigned(FaultAssignment {
    fault,
    description: String::new(),
    confidence: 0.8,
    judge: "rule_based".to_string(),
    advisory: false,
  }))
}

#[test]
fn retail_regression_fixture() {
  // 115 tasks x 4 trials, 150 successes.
  let mut records = Vec::new();
  let mut remaining = 150;
  for task in 0..115 {
    for trial in 0..4 {
      let success = remaining > 0 && trial < 2;
      if success {
        remaining -= 1;
      }
      records.push(record(&task.to_string(), trial, success));
    }
  }

  let summary = SuiteSummary::from_records(&records);
  assert_eq!(summary.evaluated_attempts, 460);
  assert_eq!(summary.successes, 150);
  assert_eq!(summary.tasks, 115);
  let pass1 = summary.pass_hat(1).unwrap();
  assert!((pass1 - 0.326).abs() < 5e-4, "pass^1 = {pass1}");
  assert_eq!(summary.pass_at(1), summary.pass_hat(1));
  assert_eq!(summary.pass_hat_k.len(), 4);
  assert_eq!(summary.pass_hat(3), Some(0.0));
}

#[test]
fn invalid_and_cancelled_are_excluded_from_denominators() {
  let mut records = vec![record("1", 0, true), record("1", 1, false)];
  records.push(AttemptRecord::invalid(Uuid::nil(), "1", Domain::Retail, 2, "bad"));
  let mut cancelled = record("1", 3, false);
  cancelled.status = AttemptStatus::Cancelled;
  records.push(cancelled);

  let summary = SuiteSummary::from_records(&records);
  assert_eq!(summary.total_attempts, 4);
  assert_eq!(summary.excluded_attempts, 1);
  assert_eq!(summary.cancelled_attempts, 1);
  assert_eq!(summary.evaluated_attempts, 2);
  assert_eq!(summary.success_rate, 0.5);
}

#[test]
fn histograms_count_errors_and_faults() {
  let mut failed = record("1", 0, false);
  failed.errors = vec![
    ErrorRecord::new(ErrorCategory::WrongArguments, Severity::Medium, 0.85),
    ErrorRecord::new(ErrorCategory::MissingTools, Severity::High, 0.9),
    ErrorRecord::new(ErrorCategory::MissingTools, Severity::High, 0.9),
  ];
  failed.fault = assigned(Fault::agent(FaultType::UsedWrongToolArgument));

  let mut unattributed = record("2", 0, false);
  unattributed.fault = Some(Attribution::Unattributed {
    reason: "timed out".to_string(),
  });

  let mut environment = record("3", 0, false);
  environment.fault = assigned(Fault::Environment);

  let summary =
    SuiteSummary::from_records(&[failed, unattributed, environment, record("4", 0, true)]);
  assert_eq!(summary.total_errors, 3);
  assert_eq!(summary.errors_by_category[&ErrorCategory::MissingTools], 2);
  assert_eq!(summary.errors_by_severity[&Severity::High], 2);
  assert_eq!(summary.faults_by_author[&FaultAuthor::Agent], 1);
  assert_eq!(summary.faults_by_author[&FaultAuthor::Environment], 1);
  assert_eq!(summary.faults_by_type[&FaultType::UsedWrongToolArgument], 1);
  assert_eq!(summary.unattributed, 1);
  assert_eq!(summary.mean_errors_per_attempt, 0.75);

  let shares = summary.category_percentages();
  assert!((shares[&ErrorCategory::MissingTools] - 200.0 / 3.0).abs() < 1e-9);
  assert_eq!(summary.author_percentages()[&FaultAuthor::Agent], 50.0);
}

#[test]
fn empty_suite_is_all_zero() {
  let summary = SuiteSummary::from_records(&[]);
  assert_eq!(summary.success_rate, 0.0);
  assert!(summary.pass_hat_k.is_empty());
  assert_eq!(percentage(0, 0), 0.0);
}

#[test]
fn summary_serializes_histogram_keys_as_names() {
  let mut failed = record("1", 0, false);
  failed.errors = vec![ErrorRecord::new(ErrorCategory::ToolFailure, Severity::Medium, 0.9)];
  let json = serde_json::to_value(SuiteSummary::from_records(&[failed])).unwrap();
  assert_eq!(json["errors_by_category"]["tool_failure"], 1);
  assert_eq!(json["errors_by_family"]["tool_usage"], 1);
}

fn bits(values: &[tauplus_aggregate::PassK]) -> Vec<u64> {
  values.iter().map(|p| p.value.to_bits()).collect()
}

#[test]
fn pass_k_is_bit_identical_regardless_of_record_order() {
  let mut records = Vec::new();
  for task in 0..97 {
    for trial in 0..5 {
      records.push(record(&format!("task-{task}"), trial, (task * 7 + trial as usize) % 3 != 0));
    }
  }
  let forward = SuiteSummary::from_records(&records);
  let again = SuiteSummary::from_records(&records);
  records.reverse();
  let reversed = SuiteSummary::from_records(&records);

  for other in [&again, &reversed] {
    assert_eq!(bits(&forward.pass_hat_k), bits(&other.pass_hat_k));
    assert_eq!(bits(&forward.pass_at_k), bits(&other.pass_at_k));
  }
}

proptest! {
  #[test]
  fn pass_hat_is_non_increasing_in_k(n in 1usize..12, c_frac in 0.0f64..=1.0) {
    let c = ((n as f64) * c_frac).round() as usize;
    let mut previous = 1.0;
    for k in 1..=n {
      let value = pass_hat(n, c, k).unwrap();
      prop_assert!(value <= previous + 1e-12);
      if c < k {
        prop_assert_eq!(value, 0.0);
      }
      previous = value;
    }
  }

  #[test]
  fn success_rate_uses_evaluated_denominator(outcomes in prop::collection::vec(0u8..3, 0..60)) {
    let records: Vec<AttemptRecord> = outcomes
      .iter()
      .enumerate()
      .map(|(i, outcome)| match outcome {
        0 => record(&i.to_string(), 0, false),
        1 => record(&i.to_string(), 0, true),
        _ => AttemptRecord::invalid(Uuid::nil(), &i.to_string(), Domain::Airline, 0, "bad"),
      })
      .collect();

    let summary = SuiteSummary::from_records(&records);
    let successes = outcomes.iter().filter(|o| **o == 1).count();
    let evaluated = outcomes.iter().filter(|o| **o < 2).count();
    prop_assert_eq!(summary.successes, successes);
    prop_assert_eq!(summary.evaluated_attempts, evaluated);
    let expected = if evaluated == 0 { 0.0 } else { successes as f64 / evaluated as f64 };
    prop_assert!((summary.success_rate - expected).abs() < 1e-12);
  }
}
