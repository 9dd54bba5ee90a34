use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// A suite run as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Run {
  pub run_id: String,
  pub domain: String,
  /// The harness configuration the run was evaluated with.
  pub config: Json<serde_json::Value>,
  pub started_at: DateTime<Utc>,
}

impl Run {
  pub fn new(run_id: Uuid, domain: impl Into<String>, config: serde_json::Value) -> Self {
    Self {
      run_id: run_id.to_string(),
      domain: domain.into(),
      config: Json(config),
      started_at: Utc::now(),
    }
  }
}
