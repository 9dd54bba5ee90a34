use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tauplus_attribution::{Attribution, FaultAuthor};
use tauplus_config::{Domain, HarnessConfig};
use tauplus_eval::{AttemptRecord, AttemptStatus, BatchEvaluator, Evaluator};
use tauplus_trajectory::testing::{TrajectoryBuilder, args};
use tauplus_trajectory::{Action, Task, Termination, Trajectory};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn evaluator() -> Evaluator {
  Evaluator::from_config(&HarnessConfig::for_domain(Domain::Retail)).unwrap()
}

fn task() -> Task {
  Task {
    task_id: "21".to_string(),
    domain: Domain::Retail,
    instruction: "Cancel order #W7 because it is no longer needed.".to_string(),
    actions: vec![Action::new(
      "cancel_pending_order",
      args(json!({"order_id": "#W7", "reason": "no longer needed"})),
    )],
    outputs: vec![],
    policies: vec![],
    initial_state: None,
    target_state: None,
  }
}

fn attempt(reason: &str) -> TrajectoryBuilder {
  TrajectoryBuilder::new("21")
    .user("Please cancel order #W7, it is no longer needed.")
    .tool_ok("get_order_details", json!({"order_id": "#W7"}), json!({"status": "pending"}))
    .agent("Order #W7 is pending. Shall I cancel it?")
    .user("Yes, go ahead.")
    .tool_ok(
      "cancel_pending_order",
      json!({"order_id": "#W7", "reason": reason}),
      json!({"status": "cancelled"}),
    )
    .agent("Your order has been cancelled.")
}

#[tokio::test]
async fn successful_attempt_has_no_fault() {
  let trajectory = attempt("no longer needed").build();
  let record = evaluator().evaluate(Uuid::new_v4(), &task(), &trajectory).await;

  assert_eq!(record.status, AttemptStatus::Completed);
  assert!(record.success);
  assert!(record.fault.is_none());
  assert!(record.errors.is_empty());
  assert_eq!(record.turn_count, 4);
  assert_eq!(record.tool_call_count, 2);
  assert_eq!(record.successful_tool_calls, 2);
  assert!(record.estimated, "token counts were not measured");
  let score = record.score.unwrap();
  assert_eq!(score.task_completion(), 1.0);
  assert_eq!(score.policy_adherence(), 1.0);
}

#[tokio::test]
async fn failed_attempt_is_attributed() {
  let trajectory = attempt("ordered by mistake").build();
  let record = evaluator().evaluate(Uuid::new_v4(), &task(), &trajectory).await;

  assert!(!record.success);
  assert!(!record.errors.is_empty());
  let Some(Attribution::Assigned(assignment)) = &record.fault else {
    panic!("expected an assignment, got {:?}", record.fault);
  };
  assert_eq!(assignment.fault.author(), FaultAuthor::Agent);
  assert!(assignment.fault.fault_type().is_some());
  assert!(!assignment.advisory);
}

#[tokio::test]
async fn malformed_trajectory_is_invalid() {
  let mut trajectory = attempt("no longer needed").build();
  trajectory.duration_secs = -1.0;
  let record = evaluator().evaluate(Uuid::new_v4(), &task(), &trajectory).await;

  assert_eq!(record.status, AttemptStatus::Invalid);
  assert!(!record.is_evaluated());
  assert!(record.invalid_reason.unwrap().contains("duration_secs"));
  assert!(record.score.is_none());
}

#[tokio::test]
async fn mismatched_task_is_invalid() {
  let trajectory = TrajectoryBuilder::new("99").user("hi").build();
  let record = evaluator().evaluate(Uuid::new_v4(), &task(), &trajectory).await;
  assert_eq!(record.status, AttemptStatus::Invalid);
}

#[tokio::test]
async fn cancelled_attempt_is_not_scored() {
  let trajectory = attempt("no longer needed")
    .termination(Termination::Cancelled)
    .build();
  let record = evaluator().evaluate(Uuid::new_v4(), &task(), &trajectory).await;

  assert_eq!(record.status, AttemptStatus::Cancelled);
  assert!(record.score.is_none());
  assert!(record.fault.is_none());
  assert_eq!(record.tool_call_count, 2);
}

#[tokio::test]
async fn record_round_trips_field_for_field() {
  let trajectory = attempt("ordered by mistake").build();
  let record = evaluator().evaluate(Uuid::new_v4(), &task(), &trajectory).await;

  let json = serde_json::to_string(&record).unwrap();
  let back = AttemptRecord::from_json(&json).unwrap();
  assert_eq!(back, record);
}

fn batch_inputs() -> (Arc<HashMap<String, Task>>, Vec<Trajectory>) {
  let tasks = Arc::new(HashMap::from([("21".to_string(), task())]));
  let trajectories = vec![
    attempt("no longer needed").trial(0).build(),
    TrajectoryBuilder::new("404").trial(0).user("hello").build(),
    attempt("ordered by mistake").trial(1).build(),
  ];
  (tasks, trajectories)
}

#[tokio::test]
async fn batch_keeps_input_order() {
  let batch = BatchEvaluator::new(Arc::new(evaluator()), 2);
  let (tasks, trajectories) = batch_inputs();
  let run_id = Uuid::new_v4();

  let records = batch
    .evaluate_all(run_id, tasks, trajectories, &CancellationToken::new())
    .await;

  assert_eq!(records.len(), 3);
  assert!(records.iter().all(|r| r.run_id == run_id));
  assert!(records[0].success);
  assert_eq!(records[1].task_id, "404");
  assert_eq!(records[1].status, AttemptStatus::Invalid);
  assert_eq!(records[2].trial, 1);
  assert!(!records[2].success);
}

#[tokio::test]
async fn batch_cancelled_up_front_records_cancellations() {
  let batch = BatchEvaluator::new(Arc::new(evaluator()), 1);
  let (tasks, trajectories) = batch_inputs();
  let cancel = CancellationToken::new();
  cancel.cancel();

  let records = batch
    .evaluate_all(Uuid::new_v4(), tasks, trajectories, &cancel)
    .await;
  assert!(records.iter().all(|r| r.status == AttemptStatus::Cancelled));
}
