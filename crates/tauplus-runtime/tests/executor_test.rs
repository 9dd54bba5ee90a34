mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, MockTools, ScriptedAgent, ScriptedUser, call, cancel_task, session};
use serde_json::json;
use tauplus_config::RetryPolicy;
use tauplus_runtime::{AgentAction, AttemptExecutor, BackendError, UserReply};
use tauplus_trajectory::{Role, Termination, ToolFailureKind, UserSignal};
use tokio_util::sync::CancellationToken;

const OPENING: &str = "Please cancel order #W7, it is no longer needed.";

fn executor() -> AttemptExecutor {
  AttemptExecutor::new(Duration::from_secs(1), 10, RetryPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn idempotent_timeout_is_retried_once_then_recorded_as_failure() {
  let tools = Arc::new(MockTools::default().script(
    "get_order_details",
    vec![Behavior::Hang, Behavior::Hang],
  ));
  let agent = ScriptedAgent::new(vec![
    AgentAction::CallTools(vec![call("get_order_details", json!({"order_id": "#W7"}))]),
    AgentAction::respond("I could not look up the order right now."),
  ]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools.clone()), &CancellationToken::new())
    .await
    .unwrap();

  let calls: Vec<_> = trajectory.tool_calls().map(|(_, c)| c).collect();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].attempts, 2);
  assert_eq!(calls[0].outcome.failure_kind(), Some(ToolFailureKind::Timeout));
  assert_eq!(tools.invocations_of("get_order_details"), 2);
  assert!(tools.rollbacks.lock().unwrap().is_empty());
  // Not a required step, so the attempt carried on.
  assert_eq!(trajectory.termination, Termination::UserStopped);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_retry() {
  let tools = Arc::new(MockTools::default().script(
    "get_order_details",
    vec![
      Behavior::Fail(BackendError::Transient("connection reset".to_string())),
      Behavior::Return(json!({"status": "pending"})),
    ],
  ));
  let agent = ScriptedAgent::new(vec![AgentAction::CallTools(vec![call(
    "get_order_details",
    json!({"order_id": "#W7"}),
  )])]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools.clone()), &CancellationToken::new())
    .await
    .unwrap();

  let record = trajectory.tool_calls().map(|(_, c)| c).next().unwrap();
  assert!(record.outcome.is_success());
  assert_eq!(record.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_arguments_are_not_retried() {
  let tools = Arc::new(MockTools::default().script(
    "get_order_details",
    vec![Behavior::Fail(BackendError::InvalidArguments(
      "order_id must start with #".to_string(),
    ))],
  ));
  let agent = ScriptedAgent::new(vec![AgentAction::CallTools(vec![call(
    "get_order_details",
    json!({"order_id": "W7"}),
  )])]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools.clone()), &CancellationToken::new())
    .await
    .unwrap();

  let record = trajectory.tool_calls().map(|(_, c)| c).next().unwrap();
  assert_eq!(record.attempts, 1);
  assert_eq!(record.outcome.failure_kind(), Some(ToolFailureKind::InvalidArguments));
  assert_eq!(tools.invocations_of("get_order_details"), 1);
}

#[tokio::test(start_paused = true)]
async fn mutating_timeout_is_rolled_back_and_ends_the_attempt_when_required() {
  let tools = Arc::new(MockTools::default().script("cancel_pending_order", vec![Behavior::Hang]));
  let agent = ScriptedAgent::new(vec![AgentAction::CallTools(vec![call(
    "cancel_pending_order",
    json!({"order_id": "#W7", "reason": "no longer needed"}),
  )])]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools.clone()), &CancellationToken::new())
    .await
    .unwrap();

  let record = trajectory.tool_calls().map(|(_, c)| c).next().unwrap();
  assert_eq!(record.attempts, 1);
  assert_eq!(record.outcome.failure_kind(), Some(ToolFailureKind::Timeout));
  assert_eq!(tools.invocations_of("cancel_pending_order"), 1);
  assert_eq!(*tools.rollbacks.lock().unwrap(), vec![record.call_id.clone()]);
  assert_eq!(
    trajectory.termination,
    Termination::RequiredToolFailed {
      call_id: record.call_id.clone(),
      tool: "cancel_pending_order".to_string(),
    }
  );
}

#[tokio::test(start_paused = true)]
async fn failed_call_with_other_arguments_does_not_end_the_attempt() {
  let tools = Arc::new(MockTools::default().script("cancel_pending_order", vec![Behavior::Hang]));
  let agent = ScriptedAgent::new(vec![
    AgentAction::CallTools(vec![call(
      "cancel_pending_order",
      json!({"order_id": "#W7", "reason": "changed my mind"}),
    )]),
    AgentAction::respond("The cancellation did not go through."),
  ]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools.clone()), &CancellationToken::new())
    .await
    .unwrap();

  let record = trajectory.tool_calls().map(|(_, c)| c).next().unwrap();
  assert_eq!(record.outcome.failure_kind(), Some(ToolFailureKind::Timeout));
  assert_eq!(*tools.rollbacks.lock().unwrap(), vec![record.call_id.clone()]);
  assert_eq!(trajectory.termination, Termination::UserStopped);
}

#[tokio::test(start_paused = true)]
async fn batch_runs_concurrently_and_keeps_issuance_order() {
  let tools = Arc::new(
    MockTools::default()
      .script(
        "get_order_details",
        vec![Behavior::Slow(Duration::from_millis(300), json!("order"))],
      )
      .script(
        "get_user_details",
        vec![Behavior::Slow(Duration::from_millis(100), json!("user"))],
      )
      .script(
        "get_product_details",
        vec![Behavior::Slow(Duration::from_millis(200), json!("product"))],
      ),
  );
  let agent = ScriptedAgent::new(vec![AgentAction::CallTools(vec![
    call("get_order_details", json!({"order_id": "#W7"})),
    call("get_user_details", json!({"user_id": "u1"})),
    call("get_product_details", json!({"product_id": "p1"})),
  ])]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let started = tokio::time::Instant::now();
  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools), &CancellationToken::new())
    .await
    .unwrap();
  let elapsed = started.elapsed();

  let names: Vec<_> = trajectory.tool_calls().map(|(_, c)| c).map(|c| c.name.as_str()).collect();
  assert_eq!(
    names,
    vec!["get_order_details", "get_user_details", "get_product_details"]
  );
  let outputs: Vec<_> = trajectory.tool_calls().map(|(_, c)| c).map(|c| c.outcome.text()).collect();
  assert_eq!(outputs, vec!["order", "user", "product"]);
  assert!(elapsed < Duration::from_millis(600), "calls ran one after another: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_waits_for_the_in_flight_batch() {
  let tools = Arc::new(MockTools::default().script(
    "get_order_details",
    vec![Behavior::Slow(Duration::from_millis(500), json!({"status": "pending"}))],
  ));
  let agent = ScriptedAgent::new(vec![
    AgentAction::CallTools(vec![call("get_order_details", json!({"order_id": "#W7"}))]),
    AgentAction::CallTools(vec![call(
      "cancel_pending_order",
      json!({"order_id": "#W7", "reason": "no longer needed"}),
    )]),
  ]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.cancel();
  });

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools.clone()), &cancel)
    .await
    .unwrap();

  assert_eq!(trajectory.termination, Termination::Cancelled);
  let calls: Vec<_> = trajectory.tool_calls().map(|(_, c)| c).collect();
  assert_eq!(calls.len(), 1);
  assert!(calls[0].outcome.is_success());
  assert_eq!(tools.invocations_of("cancel_pending_order"), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_agent_times_out() {
  let tools = Arc::new(MockTools::default());
  let agent = ScriptedAgent::new(vec![]).delayed(Duration::from_secs(30));
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(trajectory.termination, Termination::AgentTimeout);
  assert_eq!(trajectory.turns.len(), 1);
  assert_eq!(trajectory.turns[0].as_message().unwrap().role, Role::User);
}

#[tokio::test(start_paused = true)]
async fn successful_transfer_ends_the_attempt() {
  let tools = Arc::new(MockTools::default());
  let agent = ScriptedAgent::new(vec![AgentAction::CallTools(vec![call(
    "transfer_to_human_agents",
    json!({"summary": "user wants a refund outside policy"}),
  )])]);
  let user = ScriptedUser::new(OPENING, vec![]);

  let trajectory = executor()
    .run(&cancel_task("21"), 0, &session(agent, user, tools), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(trajectory.termination, Termination::Transferred);
}

#[tokio::test(start_paused = true)]
async fn step_budget_bounds_the_attempt() {
  let tools = Arc::new(MockTools::default());
  let lookups = (0..5)
    .map(|_| AgentAction::CallTools(vec![call("get_order_details", json!({"order_id": "#W7"}))]))
    .collect();
  let agent = ScriptedAgent::new(lookups);
  let user = ScriptedUser::new(OPENING, vec![]);

  let executor = AttemptExecutor::new(Duration::from_secs(1), 3, RetryPolicy::default());
  let trajectory = executor
    .run(&cancel_task("21"), 0, &session(agent, user, tools), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(trajectory.termination, Termination::MaxSteps);
  assert_eq!(trajectory.tool_call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn closing_signal_and_final_state_are_recorded() {
  let tools = Arc::new(MockTools::default());
  let agent = ScriptedAgent::new(vec![
    AgentAction::CallTools(vec![call(
      "cancel_pending_order",
      json!({"order_id": "#W7", "reason": "no longer needed"}),
    )]),
    AgentAction::respond("Order #W7 is cancelled."),
  ]);
  let user = ScriptedUser::new(
    OPENING,
    vec![UserReply::stop("Thanks!", Some(UserSignal::Rating(0.9)))],
  );

  let trajectory = executor()
    .run(&cancel_task("21"), 3, &session(agent, user, tools), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(trajectory.trial, 3);
  assert_eq!(trajectory.termination, Termination::UserStopped);
  assert_eq!(trajectory.user_signal, Some(UserSignal::Rating(0.9)));
  assert_eq!(trajectory.final_state, Some(json!({"invocations": 1})));
  assert!(!trajectory.estimated);
}
