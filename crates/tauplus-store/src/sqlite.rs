use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tauplus_eval::AttemptRecord;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, RecordStore, Run};

/// SQLite-based store implementation.
///
/// The full record is kept as JSON next to a few indexed columns, so reads
/// return exactly what was saved.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and run migrations.
  ///
  /// `sqlite::memory:` databases are limited to one connection so every
  /// query sees the same database.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let max_connections = if url.contains(":memory:") { 1 } else { 4 };
    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect_with(options)
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(&self.pool).await
  }

  pub async fn get_run(&self, run_id: Uuid) -> Result<Run, Error> {
    sqlx::query_as(
      r#"
      SELECT run_id, domain, config, started_at
      FROM runs
      WHERE run_id = ?
      "#,
    )
    .bind(run_id.to_string())
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("run {run_id}")))
  }
}

#[async_trait]
impl RecordStore for SqliteStore {
  async fn create_run(&self, run: &Run) -> Result<(), Error> {
    sqlx::query(
      r#"
      INSERT INTO runs (run_id, domain, config, started_at)
      VALUES (?, ?, ?, ?)
      "#,
    )
    .bind(&run.run_id)
    .bind(&run.domain)
    .bind(&run.config)
    .bind(run.started_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn save_record(&self, record: &AttemptRecord) -> Result<(), Error> {
    let json = serde_json::to_string(record)?;

    sqlx::query(
      r#"
      INSERT INTO attempt_records (attempt_id, run_id, task_id, trial, status, success, record, recorded_at)
      VALUES (?, ?, ?, ?, ?, ?, ?, ?)
      "#,
    )
    .bind(record.attempt_id.to_string())
    .bind(record.run_id.to_string())
    .bind(&record.task_id)
    .bind(record.trial as i64)
    .bind(record.status.as_str())
    .bind(record.success)
    .bind(json)
    .bind(record.recorded_at)
    .execute(&self.pool)
    .await?;

    debug!(attempt_id = %record.attempt_id, "record_saved");
    Ok(())
  }

  async fn get_record(&self, attempt_id: Uuid) -> Result<AttemptRecord, Error> {
    let json: Option<String> = sqlx::query_scalar(
      r#"
      SELECT record
      FROM attempt_records
      WHERE attempt_id = ?
      "#,
    )
    .bind(attempt_id.to_string())
    .fetch_optional(&self.pool)
    .await?;

    let json = json.ok_or_else(|| Error::NotFound(format!("attempt {attempt_id}")))?;
    Ok(serde_json::from_str(&json)?)
  }

  async fn list_records(&self, run_id: Uuid) -> Result<Vec<AttemptRecord>, Error> {
    let rows: Vec<String> = sqlx::query_scalar(
      r#"
      SELECT record
      FROM attempt_records
      WHERE run_id = ?
      ORDER BY rowid
      "#,
    )
    .bind(run_id.to_string())
    .fetch_all(&self.pool)
    .await?;

    rows
      .iter()
      .enumerate()
      .map(|(i, json)| {
        serde_json::from_str(json).map_err(|source| Error::Corrupt { line: i + 1, source })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use tauplus_config::Domain;

  use super::*;

  fn run(run_id: Uuid) -> Run {
    Run::new(run_id, "retail", json!({"domain": "retail"}))
  }

  #[tokio::test]
  async fn records_round_trip_in_save_order() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let run_id = Uuid::new_v4();
    store.create_run(&run(run_id)).await.unwrap();

    let first = AttemptRecord::invalid(run_id, "1", Domain::Retail, 0, "bad");
    let second = AttemptRecord::invalid(run_id, "2", Domain::Retail, 0, "worse");
    let other = AttemptRecord::invalid(Uuid::new_v4(), "3", Domain::Retail, 0, "x");
    for record in [&first, &second, &other] {
      store.save_record(record).await.unwrap();
    }

    assert_eq!(store.get_record(second.attempt_id).await.unwrap(), second);
    assert_eq!(store.list_records(run_id).await.unwrap(), vec![first, second]);
    assert_eq!(store.get_run(run_id).await.unwrap().domain, "retail");
  }

  #[tokio::test]
  async fn missing_record_is_not_found() {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    assert!(matches!(
      store.get_record(Uuid::new_v4()).await,
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn file_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("tauplus.db").display());
    let run_id = Uuid::new_v4();
    let record = AttemptRecord::invalid(run_id, "1", Domain::Airline, 0, "bad");

    {
      let store = SqliteStore::connect(&url).await.unwrap();
      store.create_run(&run(run_id)).await.unwrap();
      store.save_record(&record).await.unwrap();
    }

    let store = SqliteStore::connect(&url).await.unwrap();
    assert_eq!(store.list_records(run_id).await.unwrap(), vec![record]);
  }
}
