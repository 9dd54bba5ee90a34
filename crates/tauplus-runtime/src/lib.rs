//! tauplus runtime
//!
//! Executes attempts against caller-supplied backends and hands each closed
//! trajectory to the evaluator.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       SuiteRunner                        │
//! │  - one tokio task per (task, trial)                      │
//! │  - Semaphore bounds in-flight attempts                   │
//! │  - emits SuiteEvent through a SuiteNotifier              │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     AttemptExecutor                      │
//! │  - user opening, then agent steps up to max_steps        │
//! │  - agent / user calls under call_timeout                 │
//! │  - cancellation checked between steps                    │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ToolDispatcher                      │
//! │  - one step's calls run concurrently, kept in order      │
//! │  - idempotent calls retried once on timeout / transient  │
//! │  - timed-out mutating calls rolled back                  │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod backend;
mod dispatch;
mod error;
mod events;
mod executor;
mod runner;

pub use backend::{
  AgentAction, AgentBackend, BackendFactory, Reply, Session, ToolEnvironment, ToolRequest,
  UserReply, UserSimulator,
};
pub use dispatch::{Dispatched, ToolDispatcher};
pub use error::{BackendError, RuntimeError};
pub use events::{ChannelNotifier, NoopNotifier, SuiteEvent, SuiteNotifier};
pub use executor::AttemptExecutor;
pub use runner::SuiteRunner;
