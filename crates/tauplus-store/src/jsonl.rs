use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tauplus_eval::AttemptRecord;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::{Error, RecordStore, Run};

/// Append-only JSON lines file, one [`AttemptRecord`] per line.
///
/// Runs are not written to the file; every record carries its `run_id`.
pub struct JsonlStore {
  path: PathBuf,
  write: Mutex<()>,
}

impl JsonlStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      write: Mutex::new(()),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Read every record in a JSON lines file. Blank lines are skipped.
  pub async fn read_all(path: &Path) -> Result<Vec<AttemptRecord>, Error> {
    let contents = tokio::fs::read_to_string(path).await?;
    contents
      .lines()
      .enumerate()
      .filter(|(_, line)| !line.trim().is_empty())
      .map(|(i, line)| {
        AttemptRecord::from_json(line).map_err(|source| Error::Corrupt { line: i + 1, source })
      })
      .collect()
  }

  async fn records(&self) -> Result<Vec<AttemptRecord>, Error> {
    match tokio::fs::try_exists(&self.path).await? {
      true => Self::read_all(&self.path).await,
      false => Ok(Vec::new()),
    }
  }
}

#[async_trait]
impl RecordStore for JsonlStore {
  async fn create_run(&self, run: &Run) -> Result<(), Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await?;
    debug!(run_id = %run.run_id, path = %self.path.display(), "run_created");
    Ok(())
  }

  async fn save_record(&self, record: &AttemptRecord) -> Result<(), Error> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    // One writer at a time so lines never interleave.
    let _guard = self.write.lock().await;
    let mut file = tokio::fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
  }

  async fn get_record(&self, attempt_id: Uuid) -> Result<AttemptRecord, Error> {
    self
      .records()
      .await?
      .into_iter()
      .find(|r| r.attempt_id == attempt_id)
      .ok_or_else(|| Error::NotFound(format!("attempt {attempt_id}")))
  }

  async fn list_records(&self, run_id: Uuid) -> Result<Vec<AttemptRecord>, Error> {
    Ok(
      self
        .records()
        .await?
        .into_iter()
        .filter(|r| r.run_id == run_id)
        .collect(),
    )
  }
}
