//! Seams between the executor and the systems it drives.
//!
//! Agents, simulated users and tool environments are supplied by the caller
//! through a [`BackendFactory`], one [`Session`] per attempt.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tauplus_trajectory::{Task, Turn, UserSignal};

use crate::error::BackendError;

/// A tool invocation requested by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
  /// Backend-assigned id; the recorder generates one when absent.
  #[serde(default)]
  pub call_id: Option<String>,
  pub name: String,
  #[serde(default)]
  pub arguments: Map<String, Value>,
}

impl ToolRequest {
  pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
    Self {
      call_id: None,
      name: name.into(),
      arguments,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
  pub content: String,
  pub tokens: Option<u32>,
}

/// What the agent does on its turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
  /// Speak to the user.
  Respond(Reply),
  /// Issue one or more tool calls, run concurrently.
  CallTools(Vec<ToolRequest>),
}

impl AgentAction {
  pub fn respond(content: impl Into<String>) -> Self {
    AgentAction::Respond(Reply {
      content: content.into(),
      tokens: None,
    })
  }
}

/// A simulated user's message.
#[derive(Debug, Clone, PartialEq)]
pub struct UserReply {
  pub content: String,
  pub tokens: Option<u32>,
  /// The user ends the conversation after this message.
  pub done: bool,
  pub signal: Option<UserSignal>,
}

impl UserReply {
  pub fn says(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
      tokens: None,
      done: false,
      signal: None,
    }
  }

  pub fn stop(content: impl Into<String>, signal: Option<UserSignal>) -> Self {
    Self {
      done: true,
      signal,
      ..Self::says(content)
    }
  }
}

#[async_trait]
pub trait AgentBackend: Send + Sync {
  /// Decide the next action given the resolved history so far.
  async fn next_action(&self, history: &[Turn]) -> Result<AgentAction, BackendError>;
}

#[async_trait]
pub trait UserSimulator: Send + Sync {
  /// Opening message for the task.
  async fn start(&self, task: &Task) -> Result<UserReply, BackendError>;

  /// Reply to the agent's latest message.
  async fn reply(&self, history: &[Turn]) -> Result<UserReply, BackendError>;
}

#[async_trait]
pub trait ToolEnvironment: Send + Sync {
  /// Whether repeating a call to `tool` is safe.
  fn is_idempotent(&self, tool: &str) -> bool;

  async fn invoke(
    &self,
    call_id: &str,
    tool: &str,
    arguments: &Map<String, Value>,
  ) -> Result<Value, BackendError>;

  /// Undo whatever a timed-out call may have applied.
  async fn rollback(&self, call_id: &str) -> Result<(), BackendError>;

  /// Environment state after the attempt, compared against the task's target.
  async fn final_state(&self) -> Option<Value> {
    None
  }

  /// Reward computed by the environment itself, if it has one.
  async fn reward(&self) -> Option<f64> {
    None
  }
}

/// Backends for one attempt.
#[derive(Clone)]
pub struct Session {
  pub agent: Arc<dyn AgentBackend>,
  pub user: Arc<dyn UserSimulator>,
  pub tools: Arc<dyn ToolEnvironment>,
}

#[async_trait]
pub trait BackendFactory: Send + Sync {
  /// Fresh backends for attempt `trial` of `task`.
  async fn session(&self, task: &Task, trial: u32) -> Result<Session, BackendError>;
}
