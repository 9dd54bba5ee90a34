//! Append-only trajectory recording.
//!
//! The recorder owns the turns of one attempt while it runs. Tool calls are
//! appended when issued, so their position reflects issuance order even when
//! they resolve out of order. [`TrajectoryRecorder::close`] consumes the
//! recorder, which leaves the closed [`Trajectory`] as the only copy.

use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::catalog::ToolCatalog;
use crate::error::TrajectoryError;
use crate::trajectory::{Termination, Trajectory, UserSignal};
use crate::turn::{Message, Role, ToolCallRecord, ToolOutcome, Turn};

/// Handle to an issued but unresolved tool call.
#[derive(Debug)]
pub struct CallHandle {
  index: usize,
  call_id: String,
}

impl CallHandle {
  pub fn call_id(&self) -> &str {
    &self.call_id
  }
}

/// How a pending call resolved.
#[derive(Debug, Clone)]
pub struct Resolution {
  pub outcome: ToolOutcome,
  /// Wall-clock time across all attempts; `None` when not captured.
  pub duration: Option<Duration>,
  pub attempts: u32,
  pub tokens: Option<u32>,
}

impl Resolution {
  pub fn new(outcome: ToolOutcome) -> Self {
    Self {
      outcome,
      duration: None,
      attempts: 1,
      tokens: None,
    }
  }

  pub fn with_duration(mut self, duration: Duration) -> Self {
    self.duration = Some(duration);
    self
  }

  pub fn with_attempts(mut self, attempts: u32) -> Self {
    self.attempts = attempts;
    self
  }
}

/// Final fields supplied when closing a recorder.
#[derive(Debug, Clone)]
pub struct Closing {
  pub termination: Termination,
  pub reward: Option<f64>,
  pub final_state: Option<Value>,
  /// Overrides the measured wall-clock duration.
  pub duration: Option<Duration>,
}

impl Closing {
  pub fn new(termination: Termination) -> Self {
    Self {
      termination,
      reward: None,
      final_state: None,
      duration: None,
    }
  }
}

#[derive(Debug)]
enum Slot {
  Message(Message),
  Pending {
    call_id: String,
    name: String,
    arguments: Map<String, Value>,
  },
  Resolved(ToolCallRecord),
}

#[derive(Debug)]
pub struct TrajectoryRecorder {
  task_id: String,
  trial: u32,
  catalog: &'static ToolCatalog,
  slots: Vec<Slot>,
  started: Option<Instant>,
  user_signal: Option<UserSignal>,
  estimated: bool,
  next_call: usize,
}

impl TrajectoryRecorder {
  /// Recorder for a live attempt; duration is measured from now.
  pub fn new(task_id: impl Into<String>, trial: u32, catalog: &'static ToolCatalog) -> Self {
    Self {
      task_id: task_id.into(),
      trial,
      catalog,
      slots: Vec::new(),
      started: Some(Instant::now()),
      user_signal: None,
      estimated: false,
      next_call: 0,
    }
  }

  /// Recorder for replaying a run captured elsewhere; there is no live clock,
  /// so missing timings are estimated.
  pub fn replay(task_id: impl Into<String>, trial: u32, catalog: &'static ToolCatalog) -> Self {
    Self {
      started: None,
      ..Self::new(task_id, trial, catalog)
    }
  }

  pub fn record_message(&mut self, role: Role, content: impl Into<String>, tokens: Option<u32>) {
    self.slots.push(Slot::Message(Message {
      role,
      content: content.into(),
      tokens,
    }));
  }

  /// Append a pending tool call. `call_id` defaults to a fresh id.
  pub fn begin_tool_call(
    &mut self,
    call_id: Option<String>,
    name: impl Into<String>,
    arguments: Map<String, Value>,
  ) -> Result<CallHandle, TrajectoryError> {
    let call_id = call_id.unwrap_or_else(|| format!("call-{}", self.next_call));
    self.next_call += 1;

    if self.slots.iter().any(|s| slot_call_id(s) == Some(call_id.as_str())) {
      return Err(TrajectoryError::DuplicateCallId { call_id });
    }

    self.slots.push(Slot::Pending {
      call_id: call_id.clone(),
      name: name.into(),
      arguments,
    });
    Ok(CallHandle {
      index: self.slots.len() - 1,
      call_id,
    })
  }

  pub fn resolve_tool_call(
    &mut self,
    handle: CallHandle,
    resolution: Resolution,
  ) -> Result<(), TrajectoryError> {
    let slot = self
      .slots
      .get_mut(handle.index)
      .ok_or_else(|| TrajectoryError::UnknownCall {
        call_id: handle.call_id.clone(),
      })?;

    let (call_id, name, arguments) = match slot {
      Slot::Pending {
        call_id,
        name,
        arguments,
      } if *call_id == handle.call_id => (
        std::mem::take(call_id),
        std::mem::take(name),
        std::mem::take(arguments),
      ),
      Slot::Resolved(record) if record.call_id == handle.call_id => {
        return Err(TrajectoryError::AlreadyResolved {
          call_id: handle.call_id,
        });
      }
      _ => {
        return Err(TrajectoryError::UnknownCall {
          call_id: handle.call_id,
        });
      }
    };

    let duration_secs = match resolution.duration {
      Some(d) => d.as_secs_f64(),
      None => {
        self.estimated = true;
        self.catalog.estimated_duration(&name) * resolution.attempts.max(1) as f64
      }
    };

    *slot = Slot::Resolved(ToolCallRecord {
      call_id,
      name,
      arguments,
      outcome: resolution.outcome,
      duration_secs,
      attempts: resolution.attempts,
      tokens: resolution.tokens,
    });
    Ok(())
  }

  /// Look up a pending call by id, for replayed runs that resolve by id.
  pub fn pending_handle(&self, call_id: &str) -> Option<CallHandle> {
    self.slots.iter().enumerate().find_map(|(index, slot)| match slot {
      Slot::Pending { call_id: id, .. } if id == call_id => Some(CallHandle {
        index,
        call_id: id.clone(),
      }),
      _ => None,
    })
  }

  pub fn set_user_signal(&mut self, signal: UserSignal) {
    self.user_signal = Some(signal);
  }

  pub fn pending_calls(&self) -> usize {
    self
      .slots
      .iter()
      .filter(|s| matches!(s, Slot::Pending { .. }))
      .count()
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  /// Snapshot of the resolved history, for feeding back to the agent.
  ///
  /// Pending calls are omitted.
  pub fn history(&self) -> Vec<Turn> {
    self
      .slots
      .iter()
      .filter_map(|slot| match slot {
        Slot::Message(m) => Some(Turn::Message(m.clone())),
        Slot::Resolved(r) => Some(Turn::ToolCall(r.clone())),
        Slot::Pending { .. } => None,
      })
      .collect()
  }

  /// Freeze the recording. Fails if any tool call is still unresolved.
  pub fn close(self, closing: Closing) -> Result<Trajectory, TrajectoryError> {
    let unresolved: Vec<String> = self
      .slots
      .iter()
      .filter_map(|slot| match slot {
        Slot::Pending { call_id, .. } => Some(call_id.clone()),
        _ => None,
      })
      .collect();
    if !unresolved.is_empty() {
      return Err(TrajectoryError::UnresolvedCalls {
        call_ids: unresolved,
      });
    }

    let mut estimated = self.estimated;
    let turns: Vec<Turn> = self
      .slots
      .into_iter()
      .filter_map(|slot| match slot {
        Slot::Message(m) => Some(Turn::Message(m)),
        Slot::Resolved(r) => Some(Turn::ToolCall(r)),
        Slot::Pending { .. } => None,
      })
      .collect();

    let duration_secs = match (closing.duration, self.started) {
      (Some(d), _) => d.as_secs_f64(),
      (None, Some(started)) => started.elapsed().as_secs_f64(),
      (None, None) => {
        estimated = true;
        turns
          .iter()
          .filter_map(Turn::as_tool_call)
          .map(|c| c.duration_secs)
          .sum()
      }
    };

    let trajectory = Trajectory {
      task_id: self.task_id,
      trial: self.trial,
      turns,
      termination: closing.termination,
      reward: closing.reward,
      final_state: closing.final_state,
      user_signal: self.user_signal,
      duration_secs,
      estimated,
    };
    trajectory.validate()?;
    Ok(trajectory)
  }
}

fn slot_call_id(slot: &Slot) -> Option<&str> {
  match slot {
    Slot::Pending { call_id, .. } => Some(call_id),
    Slot::Resolved(r) => Some(&r.call_id),
    Slot::Message(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tauplus_config::Domain;

  use super::*;

  fn recorder() -> TrajectoryRecorder {
    TrajectoryRecorder::new("task-1", 0, ToolCatalog::for_domain(Domain::Retail))
  }

  fn ok(output: Value) -> Resolution {
    Resolution::new(ToolOutcome::Success { output }).with_duration(Duration::from_millis(20))
  }

  #[test]
  fn resolved_calls_keep_issuance_order() {
    let mut rec = recorder();
    rec.record_message(Role::User, "check both orders", None);
    let first = rec
      .begin_tool_call(None, "get_order_details", Map::new())
      .unwrap();
    let second = rec
      .begin_tool_call(None, "get_user_details", Map::new())
      .unwrap();

    // Second call finishes first.
    rec.resolve_tool_call(second, ok(json!("user"))).unwrap();
    rec.resolve_tool_call(first, ok(json!("order"))).unwrap();

    let trajectory = rec.close(Closing::new(Termination::UserStopped)).unwrap();
    let names: Vec<_> = trajectory.tool_calls().map(|(_, c)| c.name.as_str()).collect();
    assert_eq!(names, ["get_order_details", "get_user_details"]);
    assert!(!trajectory.estimated);
  }

  #[test]
  fn close_rejects_unresolved_calls() {
    let mut rec = recorder();
    let _pending = rec
      .begin_tool_call(Some("c1".to_string()), "get_order_details", Map::new())
      .unwrap();
    let err = rec.close(Closing::new(Termination::UserStopped)).unwrap_err();
    assert!(matches!(
      err,
      TrajectoryError::UnresolvedCalls { ref call_ids } if call_ids == &["c1"]
    ));
  }

  #[test]
  fn resolving_twice_is_an_error() {
    let mut rec = recorder();
    rec
      .begin_tool_call(Some("c1".to_string()), "calculate", Map::new())
      .unwrap();
    let handle = rec.pending_handle("c1").unwrap();
    rec.resolve_tool_call(handle, ok(json!("2"))).unwrap();

    assert!(rec.pending_handle("c1").is_none());
    let stale = CallHandle {
      index: 0,
      call_id: "c1".to_string(),
    };
    assert!(matches!(
      rec.resolve_tool_call(stale, ok(json!("3"))),
      Err(TrajectoryError::AlreadyResolved { .. })
    ));
  }

  #[test]
  fn duplicate_call_ids_are_rejected() {
    let mut rec = recorder();
    rec
      .begin_tool_call(Some("c1".to_string()), "calculate", Map::new())
      .unwrap();
    assert!(matches!(
      rec.begin_tool_call(Some("c1".to_string()), "calculate", Map::new()),
      Err(TrajectoryError::DuplicateCallId { .. })
    ));
  }

  #[test]
  fn missing_timings_are_estimated_and_flagged() {
    let mut rec = TrajectoryRecorder::replay("task-1", 2, ToolCatalog::for_domain(Domain::Retail));
    rec.record_message(Role::User, "cancel it", None);
    let handle = rec
      .begin_tool_call(None, "cancel_pending_order", Map::new())
      .unwrap();
    rec
      .resolve_tool_call(handle, Resolution::new(ToolOutcome::Success { output: json!({}) }))
      .unwrap();

    let trajectory = rec.close(Closing::new(Termination::UserStopped)).unwrap();
    assert!(trajectory.estimated);
    assert_eq!(trajectory.trial, 2);
    assert_eq!(trajectory.duration_secs, 0.5);
  }

  #[test]
  fn history_omits_pending_calls() {
    let mut rec = recorder();
    rec.record_message(Role::User, "hi", None);
    let _pending = rec.begin_tool_call(None, "calculate", Map::new()).unwrap();
    assert_eq!(rec.history().len(), 1);
    assert_eq!(rec.pending_calls(), 1);
    assert_eq!(rec.len(), 2);
  }
}
