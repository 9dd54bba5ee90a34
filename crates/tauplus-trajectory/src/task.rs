use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tauplus_config::Domain;

use crate::catalog::ToolCatalog;
use crate::policy::PolicyConstraint;

/// A ground-truth tool invocation the task expects the agent to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
  pub name: String,
  #[serde(default)]
  pub arguments: Map<String, Value>,
}

impl Action {
  pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
    Self {
      name: name.into(),
      arguments,
    }
  }
}

/// A task definition: the goal, starting state and applicable policy.
///
/// Tasks are immutable inputs; the harness never edits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub task_id: String,
  pub domain: Domain,
  /// Instruction handed to the simulated user.
  pub instruction: String,
  /// Ground-truth action sequence.
  #[serde(default)]
  pub actions: Vec<Action>,
  /// Facts the agent must communicate back to the user.
  #[serde(default)]
  pub outputs: Vec<String>,
  /// Task-specific policy constraints; empty means the domain defaults.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub policies: Vec<PolicyConstraint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub initial_state: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_state: Option<Value>,
}

impl Task {
  pub fn catalog(&self) -> &'static ToolCatalog {
    ToolCatalog::for_domain(self.domain)
  }

  pub fn effective_policies(&self) -> Cow<'_, [PolicyConstraint]> {
    if self.policies.is_empty() {
      Cow::Owned(PolicyConstraint::domain_defaults(self.domain))
    } else {
      Cow::Borrowed(&self.policies)
    }
  }

  pub fn expects_tool(&self, name: &str) -> bool {
    self.actions.iter().any(|a| a.name == name)
  }

  /// Whether the ground truth itself hands off to a human.
  pub fn expects_transfer(&self) -> bool {
    let catalog = self.catalog();
    self.actions.iter().any(|a| catalog.is_transfer(&a.name))
  }

  /// Ground-truth actions that change environment state.
  pub fn mutating_actions(&self) -> impl Iterator<Item = &Action> {
    let catalog = self.catalog();
    self.actions.iter().filter(move |a| catalog.is_mutating(&a.name))
  }
}
