//! Tool invocation under the per-call timeout and retry policy.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tauplus_config::RetryPolicy;
use tauplus_trajectory::{ToolFailureKind, ToolOutcome};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{ToolEnvironment, ToolRequest};

/// Result of dispatching one tool call, across all of its attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
  pub outcome: ToolOutcome,
  pub attempts: u32,
  pub duration: Duration,
}

#[derive(Clone)]
pub struct ToolDispatcher {
  tools: Arc<dyn ToolEnvironment>,
  timeout: Duration,
  retry: RetryPolicy,
}

impl ToolDispatcher {
  pub fn new(tools: Arc<dyn ToolEnvironment>, timeout: Duration, retry: RetryPolicy) -> Self {
    Self {
      tools,
      timeout,
      retry,
    }
  }

  /// Invoke one call, retrying idempotent calls on timeout or transient
  /// failure as the policy allows.
  ///
  /// A timed-out call that is not idempotent is rolled back and never
  /// reissued.
  pub async fn dispatch(&self, call_id: &str, request: &ToolRequest) -> Dispatched {
    let idempotent = self.tools.is_idempotent(&request.name);
    let max_attempts = 1 + self.retry.retries_for(idempotent);
    let started = Instant::now();
    let mut attempts = 0;

    loop {
      attempts += 1;
      let result = tokio::time::timeout(
        self.timeout,
        self.tools.invoke(call_id, &request.name, &request.arguments),
      )
      .await;

      let (kind, message) = match result {
        Ok(Ok(output)) => {
          debug!(call_id, tool = %request.name, attempts, "tool_call_succeeded");
          return Dispatched {
            outcome: ToolOutcome::Success { output },
            attempts,
            duration: started.elapsed(),
          };
        }
        Ok(Err(e)) => (e.failure_kind(), e.message().to_string()),
        Err(_) => (
          ToolFailureKind::Timeout,
          format!("{} did not respond within {:?}", request.name, self.timeout),
        ),
      };

      if kind == ToolFailureKind::Timeout && !idempotent {
        self.roll_back(call_id, &request.name).await;
      }

      if kind.is_retryable() && attempts < max_attempts {
        warn!(call_id, tool = %request.name, attempt = attempts, kind = ?kind, "tool_call_retry");
        continue;
      }

      warn!(
        call_id,
        tool = %request.name,
        attempts,
        kind = ?kind,
        error = %message,
        "tool_call_failed"
      );
      return Dispatched {
        outcome: ToolOutcome::Failure { kind, message },
        attempts,
        duration: started.elapsed(),
      };
    }
  }

  /// Run every call of one agent step concurrently. Results are returned in
  /// the order the calls were given, whatever order they finish in.
  pub async fn dispatch_batch(&self, calls: &[(String, ToolRequest)]) -> Vec<Dispatched> {
    join_all(
      calls
        .iter()
        .map(|(call_id, request)| self.dispatch(call_id, request)),
    )
    .await
  }

  async fn roll_back(&self, call_id: &str, tool: &str) {
    match tokio::time::timeout(self.timeout, self.tools.rollback(call_id)).await {
      Ok(Ok(())) => debug!(call_id, tool, "tool_call_rolled_back"),
      Ok(Err(e)) => warn!(call_id, tool, error = %e, "tool_call_rollback_failed"),
      Err(_) => warn!(call_id, tool, "tool_call_rollback_timed_out"),
    }
  }
}
