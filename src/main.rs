use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use tauplus_aggregate::SuiteSummary;
use tauplus_config::{Domain, HarnessConfig};
use tauplus_eval::{AttemptRecord, BatchEvaluator, Evaluator};
use tauplus_store::{JsonlStore, RecordStore, Run, SqliteStore};
use tauplus_trajectory::import::parse_recorded_runs;
use tauplus_trajectory::{Task, Trajectory};

/// tauplus - evaluation and fault attribution for tool-using agents
#[derive(Parser)]
#[command(name = "tauplus")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.tauplus)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate recorded trajectories against their tasks
  Evaluate {
    /// JSON array of task definitions
    #[arg(long)]
    tasks: PathBuf,

    /// Recorded trajectories
    #[arg(long)]
    trajectories: PathBuf,

    /// Harness configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Domain to use when no configuration file is given
    #[arg(long, default_value = "retail")]
    domain: Domain,

    #[arg(long, value_enum, default_value_t = Format::Native)]
    format: Format,

    /// Attempt records output (default: <data-dir>/runs/<run-id>.jsonl)
    #[arg(long)]
    out: Option<PathBuf>,
  },

  /// Print the suite summary of stored attempt records
  Summarize {
    /// JSON lines file written by `evaluate`
    records: PathBuf,
  },

  /// Validate a harness configuration file
  CheckConfig { config: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
  /// One trajectory JSON object per line
  Native,
  /// A tau-bench results file
  TauBench,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".tauplus"),
  };

  match cli.command {
    Some(Commands::Evaluate {
      tasks,
      trajectories,
      config,
      domain,
      format,
      out,
    }) => {
      let config = match config {
        Some(path) => HarnessConfig::load(&path)
          .with_context(|| format!("invalid configuration: {}", path.display()))?,
        None => HarnessConfig::for_domain(domain),
      };
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(evaluate(config, tasks, trajectories, format, out, data_dir))?;
    }
    Some(Commands::Summarize { records }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(summarize(records))?;
    }
    Some(Commands::CheckConfig { config }) => {
      let harness = HarnessConfig::load(&config)
        .with_context(|| format!("invalid configuration: {}", config.display()))?;
      eprintln!("Configuration is valid: {}", config.display());
      println!("{}", serde_json::to_string_pretty(&harness)?);
    }
    None => {
      println!("tauplus - use --help to see available commands");
    }
  }

  Ok(())
}

async fn evaluate(
  config: HarnessConfig,
  tasks_file: PathBuf,
  trajectories_file: PathBuf,
  format: Format,
  out: Option<PathBuf>,
  data_dir: PathBuf,
) -> Result<()> {
  let evaluator =
    Arc::new(Evaluator::from_config(&config).context("failed to set up the evaluator")?);

  let tasks = load_tasks(&tasks_file).await?;
  let domain = config.domain;
  let run_id = Uuid::new_v4();

  let content = tokio::fs::read_to_string(&trajectories_file)
    .await
    .with_context(|| format!("failed to read trajectories: {}", trajectories_file.display()))?;
  let (trajectories, rejected) = match format {
    Format::Native => parse_native(run_id, domain, &content),
    Format::TauBench => parse_tau_bench(run_id, domain, &content, &tasks)
      .with_context(|| format!("failed to parse results file: {}", trajectories_file.display()))?,
  };
  info!(
    run_id = %run_id,
    trajectories = trajectories.len(),
    rejected = rejected.len(),
    "trajectories_loaded"
  );

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, waiting for in-flight evaluations");
      on_interrupt.cancel();
    }
  });

  let batch = BatchEvaluator::new(evaluator, config.concurrency_limit);
  let mut records = batch
    .evaluate_all(run_id, Arc::new(tasks), trajectories, &cancel)
    .await;
  records.extend(rejected);

  let out = out.unwrap_or_else(|| data_dir.join("runs").join(format!("{run_id}.jsonl")));
  persist(&config, run_id, &records, &out, &data_dir).await?;

  let summary = SuiteSummary::from_records(&records);
  eprintln!("Wrote {} records to {}", records.len(), out.display());
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}

async fn summarize(path: PathBuf) -> Result<()> {
  let records = JsonlStore::read_all(&path)
    .await
    .with_context(|| format!("failed to read records: {}", path.display()))?;
  let summary = SuiteSummary::from_records(&records);
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}

async fn load_tasks(path: &Path) -> Result<HashMap<String, Task>> {
  let content = tokio::fs::read_to_string(path)
    .await
    .with_context(|| format!("failed to read tasks: {}", path.display()))?;
  let tasks: Vec<Task> = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse tasks: {}", path.display()))?;
  Ok(
    tasks
      .into_iter()
      .map(|task| (task.task_id.clone(), task))
      .collect(),
  )
}

/// Parse one trajectory per line. Lines that fail to parse become invalid
/// records rather than aborting the run.
fn parse_native(
  run_id: Uuid,
  domain: Domain,
  content: &str,
) -> (Vec<Trajectory>, Vec<AttemptRecord>) {
  let mut trajectories = Vec::new();
  let mut rejected = Vec::new();

  for (index, line) in content.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    match Trajectory::from_json(line) {
      Ok(trajectory) => trajectories.push(trajectory),
      Err(e) => {
        let (task_id, trial) = identify(line);
        warn!(line = index + 1, error = %e, "trajectory_rejected");
        rejected.push(AttemptRecord::invalid(
          run_id,
          &task_id,
          domain,
          trial,
          format!("line {}: {e}", index + 1),
        ));
      }
    }
  }
  (trajectories, rejected)
}

fn parse_tau_bench(
  run_id: Uuid,
  domain: Domain,
  content: &str,
  tasks: &HashMap<String, Task>,
) -> Result<(Vec<Trajectory>, Vec<AttemptRecord>)> {
  let mut trajectories = Vec::new();
  let mut rejected = Vec::new();

  for run in parse_recorded_runs(content)? {
    let task_id = run.task_key();
    let trial = run.trial;
    let Some(task) = tasks.get(&task_id) else {
      rejected.push(AttemptRecord::invalid(
        run_id,
        &task_id,
        domain,
        trial,
        format!("unknown task `{task_id}`"),
      ));
      continue;
    };
    match run.into_trajectory(task) {
      Ok(trajectory) => trajectories.push(trajectory),
      Err(e) => {
        warn!(task_id = %task_id, trial, error = %e, "trajectory_rejected");
        rejected.push(AttemptRecord::invalid(run_id, &task_id, domain, trial, e.to_string()));
      }
    }
  }
  Ok((trajectories, rejected))
}

/// Best-effort task id and trial from a line that failed validation.
fn identify(line: &str) -> (String, u32) {
  let value: Value = serde_json::from_str(line).unwrap_or(Value::Null);
  let task_id = match value.get("task_id") {
    Some(Value::String(s)) => s.clone(),
    Some(other) => other.to_string(),
    None => "unknown".to_string(),
  };
  let trial = value
    .get("trial")
    .and_then(Value::as_u64)
    .and_then(|t| u32::try_from(t).ok())
    .unwrap_or(0);
  (task_id, trial)
}

async fn persist(
  config: &HarnessConfig,
  run_id: Uuid,
  records: &[AttemptRecord],
  out: &Path,
  data_dir: &Path,
) -> Result<()> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let run = Run::new(run_id, config.domain.as_str(), serde_json::to_value(config)?);

  let jsonl = JsonlStore::new(out);
  let db_url = format!("sqlite://{}", data_dir.join("tauplus.db").display());
  let sqlite = SqliteStore::connect(&db_url)
    .await
    .context("failed to open the record database")?;

  let stores: [&dyn RecordStore; 2] = [&jsonl, &sqlite];
  for store in stores {
    store.create_run(&run).await?;
    for record in records {
      store.save_record(record).await?;
    }
  }
  Ok(())
}
