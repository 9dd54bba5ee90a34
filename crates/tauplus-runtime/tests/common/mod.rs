#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tauplus_config::Domain;
use tauplus_runtime::{
  AgentAction, AgentBackend, BackendError, Session, ToolEnvironment, ToolRequest, UserReply,
  UserSimulator,
};
use tauplus_trajectory::testing::args;
use tauplus_trajectory::{Action, Task, ToolCatalog, Turn};

pub fn cancel_task(task_id: &str) -> Task {
  Task {
    task_id: task_id.to_string(),
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

pub fn call(name: &str, arguments: Value) -> ToolRequest {
  ToolRequest::new(name, args(arguments))
}

/// Tracks how many calls overlap.
#[derive(Debug, Default)]
pub struct Gauge {
  current: AtomicUsize,
  peak: AtomicUsize,
}

impl Gauge {
  pub fn enter(&self) {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
  }

  pub fn exit(&self) {
    self.current.fetch_sub(1, Ordering::SeqCst);
  }

  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

/// Plays back a fixed list of actions, then keeps saying goodbye.
pub struct ScriptedAgent {
  actions: Mutex<VecDeque<AgentAction>>,
  delay: Duration,
  gauge: Option<Arc<Gauge>>,
}

impl ScriptedAgent {
  pub fn new(actions: Vec<AgentAction>) -> Self {
    Self {
      actions: Mutex::new(actions.into()),
      delay: Duration::ZERO,
      gauge: None,
    }
  }

  pub fn delayed(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn gauged(mut self, gauge: Arc<Gauge>) -> Self {
    self.gauge = Some(gauge);
    self
  }
}

#[async_trait]
impl AgentBackend for ScriptedAgent {
  async fn next_action(&self, _history: &[Turn]) -> Result<AgentAction, BackendError> {
    if let Some(gauge) = &self.gauge {
      gauge.enter();
    }
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    if let Some(gauge) = &self.gauge {
      gauge.exit();
    }
    let next = self.actions.lock().unwrap().pop_front();
    Ok(next.unwrap_or_else(|| AgentAction::respond("Is there anything else I can help with?")))
  }
}

/// Opens with a fixed message, plays back replies, then stops.
pub struct ScriptedUser {
  opening: String,
  replies: Mutex<VecDeque<UserReply>>,
}

impl ScriptedUser {
  pub fn new(opening: &str, replies: Vec<UserReply>) -> Self {
    Self {
      opening: opening.to_string(),
      replies: Mutex::new(replies.into()),
    }
  }
}

#[async_trait]
impl UserSimulator for ScriptedUser {
  async fn start(&self, _task: &Task) -> Result<UserReply, BackendError> {
    Ok(UserReply::says(self.opening.clone()))
  }

  async fn reply(&self, _history: &[Turn]) -> Result<UserReply, BackendError> {
    let next = self.replies.lock().unwrap().pop_front();
    Ok(next.unwrap_or_else(|| UserReply::stop("###STOP###", None)))
  }
}

pub enum Behavior {
  Return(Value),
  Fail(BackendError),
  /// Respond after a delay.
  Slow(Duration, Value),
  /// Never respond.
  Hang,
}

/// Retail tool environment with per-tool scripted behaviors. Tools without
/// a script succeed immediately.
#[derive(Default)]
pub struct MockTools {
  scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
  pub invocations: Mutex<Vec<String>>,
  pub rollbacks: Mutex<Vec<String>>,
}

impl MockTools {
  pub fn script(self, tool: &str, behaviors: Vec<Behavior>) -> Self {
    self
      .scripts
      .lock()
      .unwrap()
      .insert(tool.to_string(), behaviors.into());
    self
  }

  pub fn invocations_of(&self, tool: &str) -> usize {
    self
      .invocations
      .lock()
      .unwrap()
      .iter()
      .filter(|name| *name == tool)
      .count()
  }
}

#[async_trait]
impl ToolEnvironment for MockTools {
  fn is_idempotent(&self, tool: &str) -> bool {
    ToolCatalog::for_domain(Domain::Retail).is_idempotent(tool)
  }

  async fn invoke(
    &self,
    _call_id: &str,
    tool: &str,
    _arguments: &Map<String, Value>,
  ) -> Result<Value, BackendError> {
    self.invocations.lock().unwrap().push(tool.to_string());
    let behavior = self
      .scripts
      .lock()
      .unwrap()
      .get_mut(tool)
      .and_then(|script| script.pop_front());

    match behavior {
      None => Ok(json!({"ok": true})),
      Some(Behavior::Return(value)) => Ok(value),
      Some(Behavior::Fail(error)) => Err(error),
      Some(Behavior::Slow(delay, value)) => {
        tokio::time::sleep(delay).await;
        Ok(value)
      }
      Some(Behavior::Hang) => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
      }
    }
  }

  async fn rollback(&self, call_id: &str) -> Result<(), BackendError> {
    self.rollbacks.lock().unwrap().push(call_id.to_string());
    Ok(())
  }

  async fn final_state(&self) -> Option<Value> {
    Some(json!({"invocations": self.invocations.lock().unwrap().len()}))
  }
}

pub fn session(agent: ScriptedAgent, user: ScriptedUser, tools: Arc<MockTools>) -> Session {
  Session {
    agent: Arc::new(agent),
    user: Arc::new(user),
    tools,
  }
}
