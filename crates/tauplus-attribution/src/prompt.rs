//! Prompt rendering for the model judge.

use minijinja::{Environment, Value};
use serde::Serialize;
use tauplus_trajectory::{Role, Task, Trajectory, Turn};

use crate::error::JudgeError;

const CONTEXT: &str = include_str!("../templates/context.txt");
const QUESTION: &str = include_str!("../templates/question.txt");

pub(crate) const AUTHOR_QUESTION: &str = "Determine the party responsible for the fault. \
The user is responsible when they caused an action that is not grounded in the user instruction. \
The agent is responsible when it took an incorrect action or called a tool with wrong arguments. \
The environment is responsible for every other fault.";

pub(crate) const FAULT_TYPE_QUESTION: &str = "The agent is responsible for the fault. \
Determine which kind of mistake the agent made.";

#[derive(Serialize)]
struct ContextVars<'a> {
  instruction: &'a str,
  outputs: &'a [String],
  actions: Vec<String>,
  transcript: Vec<String>,
}

#[derive(Serialize)]
struct QuestionVars<'a> {
  outputs: bool,
  question: &'a str,
  options: &'a [&'a str],
}

/// Holds the compiled prompt templates.
pub(crate) struct Prompts {
  env: Environment<'static>,
}

impl Prompts {
  pub(crate) fn new() -> Result<Self, JudgeError> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_template("context", CONTEXT)?;
    env.add_template("question", QUESTION)?;
    Ok(Self { env })
  }

  /// The task and trajectory as shown to the model. System messages are
  /// left out.
  pub(crate) fn context(&self, task: &Task, trajectory: &Trajectory) -> Result<String, JudgeError> {
    let actions = task
      .actions
      .iter()
      .map(|a| format!("{} {}", a.name, serde_json::Value::Object(a.arguments.clone())))
      .collect();
    let transcript = trajectory
      .turns
      .iter()
      .filter_map(|turn| match turn {
        Turn::Message(m) => match m.role {
          Role::System => None,
          Role::User => Some(format!("User: {}", m.content)),
          Role::Agent => Some(format!("Agent: {}", m.content)),
        },
        Turn::ToolCall(c) => Some(format!(
          "Tool: {} {} -> {}",
          c.name,
          serde_json::Value::Object(c.arguments.clone()),
          c.outcome.text()
        )),
      })
      .collect();

    let vars = ContextVars {
      instruction: &task.instruction,
      outputs: &task.outputs,
      actions,
      transcript,
    };
    self.render("context", &vars)
  }

  pub(crate) fn question(
    &self,
    task: &Task,
    question: &str,
    options: &[&str],
  ) -> Result<String, JudgeError> {
    let vars = QuestionVars {
      outputs: !task.outputs.is_empty(),
      question,
      options,
    };
    self.render("question", &vars)
  }

  fn render<S: Serialize>(&self, name: &str, vars: &S) -> Result<String, JudgeError> {
    let template = self.env.get_template(name)?;
    Ok(template.render(Value::from_serialize(vars))?)
  }
}
