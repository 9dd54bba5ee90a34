use std::time::Duration;

use tauplus_config::{HarnessConfig, RetryPolicy};
use tauplus_trajectory::{
  Closing, Resolution, Role, Task, Termination, ToolCatalog, Trajectory, TrajectoryRecorder,
  arguments_match,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::backend::{AgentAction, Session, ToolRequest, UserReply};
use crate::dispatch::ToolDispatcher;
use crate::error::RuntimeError;

/// Drives one attempt: user opening, then alternating agent steps until the
/// user stops, a backend fails, or the step budget runs out.
#[derive(Debug, Clone)]
pub struct AttemptExecutor {
  call_timeout: Duration,
  max_steps: u32,
  retry: RetryPolicy,
}

impl AttemptExecutor {
  pub fn new(call_timeout: Duration, max_steps: u32, retry: RetryPolicy) -> Self {
    Self {
      call_timeout,
      max_steps,
      retry,
    }
  }

  pub fn from_config(config: &HarnessConfig) -> Self {
    Self::new(config.call_timeout(), config.max_steps, config.retry)
  }

  /// Run an attempt to completion and close its trajectory.
  ///
  /// Cancellation is observed between steps. A tool batch that is already
  /// in flight always resolves before the attempt ends as cancelled.
  #[instrument(name = "attempt", skip_all, fields(task_id = %task.task_id, trial = trial))]
  pub async fn run(
    &self,
    task: &Task,
    trial: u32,
    session: &Session,
    cancel: &CancellationToken,
  ) -> Result<Trajectory, RuntimeError> {
    let catalog = ToolCatalog::for_domain(task.domain);
    let mut recorder = TrajectoryRecorder::new(task.task_id.clone(), trial, catalog);
    let dispatcher = ToolDispatcher::new(session.tools.clone(), self.call_timeout, self.retry);

    let termination = self
      .drive(task, session, &dispatcher, &mut recorder, cancel)
      .await?;

    let mut closing = Closing::new(termination);
    closing.final_state = session.tools.final_state().await;
    closing.reward = session.tools.reward().await;
    let trajectory = recorder.close(closing)?;

    info!(
      turns = trajectory.turn_count(),
      tool_calls = trajectory.tool_call_count(),
      termination = %trajectory.termination.describe(),
      "attempt_finished"
    );
    Ok(trajectory)
  }

  async fn drive(
    &self,
    task: &Task,
    session: &Session,
    dispatcher: &ToolDispatcher,
    recorder: &mut TrajectoryRecorder,
    cancel: &CancellationToken,
  ) -> Result<Termination, RuntimeError> {
    if cancel.is_cancelled() {
      return Ok(Termination::Cancelled);
    }

    let opening = match tokio::time::timeout(self.call_timeout, session.user.start(task)).await {
      Ok(Ok(reply)) => reply,
      Ok(Err(e)) => return Ok(Termination::UserError { message: e.to_string() }),
      Err(_) => return Ok(Termination::UserTimeout),
    };
    if record_user(recorder, opening) {
      return Ok(Termination::UserStopped);
    }

    for step in 0..self.max_steps {
      if cancel.is_cancelled() {
        info!(step, "attempt_cancelled");
        return Ok(Termination::Cancelled);
      }

      let history = recorder.history();
      let action =
        match tokio::time::timeout(self.call_timeout, session.agent.next_action(&history)).await {
          Ok(Ok(action)) => action,
          Ok(Err(e)) => {
            warn!(step, error = %e, "agent_failed");
            return Ok(Termination::AgentError { message: e.to_string() });
          }
          Err(_) => {
            warn!(step, "agent_timed_out");
            return Ok(Termination::AgentTimeout);
          }
        };

      match action {
        AgentAction::Respond(reply) => {
          recorder.record_message(Role::Agent, reply.content, reply.tokens);
          let history = recorder.history();
          let reply = tokio::time::timeout(self.call_timeout, session.user.reply(&history)).await;
          let reply = match reply {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
              warn!(step, error = %e, "user_failed");
              return Ok(Termination::UserError { message: e.to_string() });
            }
            Err(_) => {
              warn!(step, "user_timed_out");
              return Ok(Termination::UserTimeout);
            }
          };
          if record_user(recorder, reply) {
            return Ok(Termination::UserStopped);
          }
        }
        AgentAction::CallTools(requests) => {
          if let Some(termination) = run_tools(task, dispatcher, recorder, requests).await? {
            return Ok(termination);
          }
        }
      }
    }

    info!(max_steps = self.max_steps, "step_budget_exhausted");
    Ok(Termination::MaxSteps)
  }
}

/// Record a user message; returns whether the user ended the conversation.
fn record_user(recorder: &mut TrajectoryRecorder, reply: UserReply) -> bool {
  recorder.record_message(Role::User, reply.content, reply.tokens);
  if let Some(signal) = reply.signal {
    recorder.set_user_signal(signal);
  }
  reply.done
}

/// Issue one step's tool calls and resolve them in issuance order.
///
/// Ends the attempt when a call the task requires failed for environmental
/// reasons, or when a transfer to a human succeeded.
async fn run_tools(
  task: &Task,
  dispatcher: &ToolDispatcher,
  recorder: &mut TrajectoryRecorder,
  requests: Vec<ToolRequest>,
) -> Result<Option<Termination>, RuntimeError> {
  let catalog = ToolCatalog::for_domain(task.domain);

  let mut handles = Vec::with_capacity(requests.len());
  let mut calls = Vec::with_capacity(requests.len());
  for request in requests {
    let handle = recorder.begin_tool_call(
      request.call_id.clone(),
      request.name.clone(),
      request.arguments.clone(),
    )?;
    calls.push((handle.call_id().to_string(), request));
    handles.push(handle);
  }

  let results = dispatcher.dispatch_batch(&calls).await;

  let mut termination = None;
  for ((handle, (call_id, request)), dispatched) in handles.into_iter().zip(calls).zip(results) {
    let environmental = dispatched
      .outcome
      .failure_kind()
      .is_some_and(|kind| kind.is_environmental());
    let succeeded = dispatched.outcome.is_success();

    recorder.resolve_tool_call(
      handle,
      Resolution::new(dispatched.outcome)
        .with_duration(dispatched.duration)
        .with_attempts(dispatched.attempts),
    )?;

    if termination.is_some() {
      continue;
    }
    let required = task
      .actions
      .iter()
      .any(|a| a.name == request.name && arguments_match(&a.arguments, &request.arguments));
    if environmental && required {
      warn!(call_id = %call_id, tool = %request.name, "required_tool_failed");
      termination = Some(Termination::RequiredToolFailed {
        call_id,
        tool: request.name,
      });
    } else if succeeded && catalog.is_transfer(&request.name) {
      termination = Some(Termination::Transferred);
    }
  }
  Ok(termination)
}
