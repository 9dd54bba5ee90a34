use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tauplus_attribution::Attribution;
use tauplus_classifier::ErrorRecord;
use tauplus_config::Domain;
use tauplus_scoring::ScoreResult;
use tauplus_trajectory::{Termination, TokenUsage, Transfer, Trajectory};
use uuid::Uuid;

/// Version of the persisted [`AttemptRecord`] layout.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

/// Schema version tag; deserialization rejects anything but the current
/// version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
  pub const CURRENT: SchemaVersion = SchemaVersion(RECORD_SCHEMA_VERSION);

  pub fn get(&self) -> u32 {
    self.0
  }
}

impl<'de> Deserialize<'de> for SchemaVersion {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let version = u32::deserialize(deserializer)?;
    if version != RECORD_SCHEMA_VERSION {
      return Err(serde::de::Error::custom(format!(
        "unsupported record schema version {version}, expected {RECORD_SCHEMA_VERSION}"
      )));
    }
    Ok(SchemaVersion(version))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
  /// Scored and classified.
  Completed,
  /// Could not be scored; excluded from statistics.
  Invalid,
  /// Stopped by a suite-level abort.
  Cancelled,
}

impl AttemptStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      AttemptStatus::Completed => "completed",
      AttemptStatus::Invalid => "invalid",
      AttemptStatus::Cancelled => "cancelled",
    }
  }
}

/// The per-attempt result, and the only durable artifact of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
  pub schema_version: SchemaVersion,
  pub run_id: Uuid,
  pub attempt_id: Uuid,
  pub task_id: String,
  pub domain: Domain,
  pub trial: u32,
  pub status: AttemptStatus,
  #[serde(default)]
  pub invalid_reason: Option<String>,
  /// Binary outcome; always false unless the status is completed.
  pub success: bool,
  #[serde(default)]
  pub score: Option<ScoreResult>,
  #[serde(default)]
  pub errors: Vec<ErrorRecord>,
  /// Present exactly for completed, failed attempts.
  #[serde(default)]
  pub fault: Option<Attribution>,
  pub turn_count: u32,
  pub tool_call_count: u32,
  pub successful_tool_calls: u32,
  pub token_usage: TokenUsage,
  pub duration_secs: f64,
  /// Token counts or timings were estimated rather than measured.
  pub estimated: bool,
  #[serde(default)]
  pub transfer: Option<Transfer>,
  #[serde(default)]
  pub termination: Option<Termination>,
  pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
  fn blank(run_id: Uuid, task_id: &str, domain: Domain, trial: u32, status: AttemptStatus) -> Self {
    Self {
      schema_version: SchemaVersion::CURRENT,
      run_id,
      attempt_id: Uuid::new_v4(),
      task_id: task_id.to_string(),
      domain,
      trial,
      status,
      invalid_reason: None,
      success: false,
      score: None,
      errors: Vec::new(),
      fault: None,
      turn_count: 0,
      tool_call_count: 0,
      successful_tool_calls: 0,
      token_usage: TokenUsage::default(),
      duration_secs: 0.0,
      estimated: false,
      transfer: None,
      termination: None,
      recorded_at: Utc::now(),
    }
  }

  /// A record for an attempt that could not be scored.
  pub fn invalid(
    run_id: Uuid,
    task_id: &str,
    domain: Domain,
    trial: u32,
    reason: impl Into<String>,
  ) -> Self {
    Self {
      invalid_reason: Some(reason.into()),
      ..Self::blank(run_id, task_id, domain, trial, AttemptStatus::Invalid)
    }
  }

  /// A record for an attempt stopped by a suite abort. Counters reflect
  /// whatever was recorded before the stop.
  pub fn cancelled(run_id: Uuid, domain: Domain, trajectory: &Trajectory) -> Self {
    Self::blank(
      run_id,
      &trajectory.task_id,
      domain,
      trajectory.trial,
      AttemptStatus::Cancelled,
    )
    .with_metrics(trajectory)
  }

  /// A cancelled record for an attempt that never started running.
  pub fn not_started(run_id: Uuid, task_id: &str, domain: Domain, trial: u32) -> Self {
    Self {
      termination: Some(Termination::Cancelled),
      ..Self::blank(run_id, task_id, domain, trial, AttemptStatus::Cancelled)
    }
  }

  pub(crate) fn completed(run_id: Uuid, domain: Domain, trajectory: &Trajectory) -> Self {
    Self::blank(
      run_id,
      &trajectory.task_id,
      domain,
      trajectory.trial,
      AttemptStatus::Completed,
    )
    .with_metrics(trajectory)
  }

  fn with_metrics(mut self, trajectory: &Trajectory) -> Self {
    let usage = trajectory.token_usage();
    self.turn_count = trajectory.turn_count();
    self.tool_call_count = trajectory.tool_call_count();
    self.successful_tool_calls = trajectory.successful_tool_calls();
    self.token_usage = usage;
    self.duration_secs = trajectory.duration_secs;
    self.estimated = trajectory.estimated || usage.estimated;
    self.termination = Some(trajectory.termination.clone());
    self
  }

  /// Counts toward success-rate denominators.
  pub fn is_evaluated(&self) -> bool {
    self.status == AttemptStatus::Completed
  }

  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }
}
