//! tauplus store
//!
//! Storage for attempt records. The [`RecordStore`] trait defines:
//! - registering a suite run
//! - appending attempt records
//! - reading records back by attempt or by run
//!
//! [`JsonlStore`] writes the append-only JSON lines file that downstream
//! reporting reads; [`SqliteStore`] keeps a queryable copy in SQLite.

mod jsonl;
mod sqlite;
mod types;

pub use jsonl::JsonlStore;
pub use sqlite::SqliteStore;
pub use types::Run;

use async_trait::async_trait;
use tauplus_eval::AttemptRecord;
use uuid::Uuid;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("migration failed: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("record serialization failed: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A stored line could not be read back as a record.
  #[error("corrupt record at line {line}: {source}")]
  Corrupt {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
}

/// Storage trait for suite runs and their attempt records.
#[async_trait]
pub trait RecordStore: Send + Sync {
  /// Register a new run.
  async fn create_run(&self, run: &Run) -> Result<(), Error>;

  /// Append one attempt record.
  async fn save_record(&self, record: &AttemptRecord) -> Result<(), Error>;

  /// Get a record by attempt ID.
  async fn get_record(&self, attempt_id: Uuid) -> Result<AttemptRecord, Error>;

  /// List a run's records in the order they were saved.
  async fn list_records(&self, run_id: Uuid) -> Result<Vec<AttemptRecord>, Error>;
}
