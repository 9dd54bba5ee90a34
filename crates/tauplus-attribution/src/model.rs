use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tauplus_config::ModelJudgeConfig;
use tauplus_trajectory::{Task, Trajectory};
use tracing::{debug, instrument};

use crate::error::JudgeError;
use crate::judge::FaultJudge;
use crate::prompt::{AUTHOR_QUESTION, FAULT_TYPE_QUESTION, Prompts};
use crate::types::{Fault, FaultType, Judgment};

const AUTHOR_OPTIONS: [(&str, Option<Fault>); 3] = [
  ("The user", Some(Fault::User)),
  ("The agent", None),
  ("The environment (neither user nor agent)", Some(Fault::Environment)),
];

const FAULT_TYPE_OPTIONS: [(&str, FaultType); 5] = [
  ("The agent called the wrong tool", FaultType::CalledWrongTool),
  (
    "The agent used the correct tool with a wrong argument",
    FaultType::UsedWrongToolArgument,
  ),
  ("The goal was only partially completed", FaultType::GoalPartiallyCompleted),
  ("The agent timed out or hit an API error", FaultType::TimeoutOrApiError),
  ("Other", FaultType::Other),
];

/// Judge backed by an OpenAI-compatible chat-completions endpoint.
///
/// Asks two questions: who is at fault, then, for agent faults, what kind
/// of mistake it was. Verdicts are advisory.
pub struct ModelJudge {
  client: Client,
  url: String,
  model: String,
  api_key: String,
  prompts: Prompts,
}

impl ModelJudge {
  pub fn new(
    endpoint: &str,
    model: impl Into<String>,
    api_key: impl Into<String>,
  ) -> Result<Self, JudgeError> {
    Ok(Self {
      client: Client::builder().build()?,
      url: chat_completions_url(endpoint),
      model: model.into(),
      api_key: api_key.into(),
      prompts: Prompts::new()?,
    })
  }

  /// Build from configuration, reading the API key from the configured
  /// environment variable.
  pub fn from_config(config: &ModelJudgeConfig) -> Result<Self, JudgeError> {
    let api_key =
      std::env::var(&config.api_key_env).map_err(|_| JudgeError::MissingApiKey {
        var: config.api_key_env.clone(),
      })?;
    Self::new(&config.endpoint, config.model.clone(), api_key)
  }

  async fn ask(&self, system: String, context: &str) -> Result<Verdict, JudgeError> {
    let request = ChatRequest {
      model: &self.model,
      temperature: 0.0,
      messages: vec![
        ChatMessage {
          role: "system",
          content: &system,
        },
        ChatMessage {
          role: "user",
          content: context,
        },
      ],
    };

    let response = self
      .client
      .post(&self.url)
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(JudgeError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let completion: ChatResponse = response.json().await?;
    let content = completion
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| JudgeError::MalformedResponse("no completion content".to_string()))?;
    debug!(raw = %content, "judge_response");
    parse_verdict(&content)
  }
}

#[async_trait]
impl FaultJudge for ModelJudge {
  fn name(&self) -> &'static str {
    "model"
  }

  fn advisory(&self) -> bool {
    true
  }

  #[instrument(
    name = "model_judge",
    skip(self, task, trajectory),
    fields(task_id = %task.task_id, trial = trajectory.trial)
  )]
  async fn judge(&self, task: &Task, trajectory: &Trajectory) -> Result<Judgment, JudgeError> {
    if trajectory.is_empty() {
      return Ok(Judgment::new(
        Fault::agent(FaultType::TimeoutOrApiError),
        "empty trajectory, usually a timeout or API failure",
        1.0,
      ));
    }

    let context = self.prompts.context(task, trajectory)?;

    let labels: Vec<&str> = AUTHOR_OPTIONS.iter().map(|(label, _)| *label).collect();
    let system = self.prompts.question(task, AUTHOR_QUESTION, &labels)?;
    let author = self.ask(system, &context).await?;
    let (_, fault) = pick(&AUTHOR_OPTIONS, author.option, "author")?;
    if let Some(fault) = fault {
      return Ok(Judgment::new(*fault, author.description, author.confidence));
    }

    let labels: Vec<&str> = FAULT_TYPE_OPTIONS.iter().map(|(label, _)| *label).collect();
    let system = self.prompts.question(task, FAULT_TYPE_QUESTION, &labels)?;
    let kind = self.ask(system, &context).await?;
    let (_, fault_type) = pick(&FAULT_TYPE_OPTIONS, kind.option, "fault_type")?;

    let description = if kind.description.is_empty() {
      author.description
    } else {
      kind.description
    };
    Ok(Judgment::new(
      Fault::agent(*fault_type),
      description,
      author.confidence.min(kind.confidence),
    ))
  }
}

/// Options are numbered from 1 in the prompt.
fn pick<'a, T>(options: &'a [T], option: u64, stage: &'static str) -> Result<&'a T, JudgeError> {
  option
    .checked_sub(1)
    .and_then(|i| usize::try_from(i).ok())
    .and_then(|i| options.get(i))
    .ok_or(JudgeError::InvalidOption { stage, option })
}

/// Append `/chat/completions` unless the endpoint already names it.
pub fn chat_completions_url(endpoint: &str) -> String {
  let base = endpoint.trim_end_matches('/');
  if base.ends_with("/chat/completions") {
    base.to_string()
  } else {
    format!("{base}/chat/completions")
  }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  temperature: f64,
  messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'static str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
  content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Verdict {
  option: u64,
  #[serde(default = "default_confidence")]
  confidence: f64,
  #[serde(default)]
  description: String,
}

fn default_confidence() -> f64 {
  0.5
}

/// Models wrap JSON in prose or code fences; take the outermost object.
fn parse_verdict(content: &str) -> Result<Verdict, JudgeError> {
  let start = content.find('{');
  let end = content.rfind('}');
  let json = match (start, end) {
    (Some(start), Some(end)) if start < end => &content[start..=end],
    _ => {
      return Err(JudgeError::MalformedResponse(format!(
        "no JSON object in `{content}`"
      )));
    }
  };
  let verdict: Verdict =
    serde_json::from_str(json).map_err(|e| JudgeError::MalformedResponse(e.to_string()))?;
  if !verdict.confidence.is_finite() {
    return Err(JudgeError::MalformedResponse(
      "confidence is not a number".to_string(),
    ));
  }
  Ok(verdict)
}
