//! Suite progress events and notifiers.
//!
//! The runner emits one event per attempt transition so callers can stream
//! progress or persist records as they arrive.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SuiteEvent {
  SuiteStarted { run_id: Uuid, attempts: usize },

  AttemptStarted {
    run_id: Uuid,
    task_id: String,
    trial: u32,
  },

  /// The attempt ran and was evaluated.
  AttemptCompleted {
    run_id: Uuid,
    task_id: String,
    trial: u32,
    success: bool,
  },

  /// The attempt could not be run or produced an invalid trajectory.
  AttemptFailed {
    run_id: Uuid,
    task_id: String,
    trial: u32,
    error: String,
  },

  AttemptCancelled {
    run_id: Uuid,
    task_id: String,
    trial: u32,
  },

  SuiteCompleted { run_id: Uuid, records: usize },
}

/// Receives suite events as they happen.
pub trait SuiteNotifier: Send + Sync {
  fn notify(&self, event: SuiteEvent);
}

#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl SuiteNotifier for NoopNotifier {
  fn notify(&self, _event: SuiteEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls attempts; volume is a handful
  // of events per attempt.
  sender: mpsc::UnboundedSender<SuiteEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<SuiteEvent>) -> Self {
    Self { sender }
  }
}

impl SuiteNotifier for ChannelNotifier {
  fn notify(&self, event: SuiteEvent) {
    // Receiver may have been dropped.
    let _ = self.sender.send(event);
  }
}
