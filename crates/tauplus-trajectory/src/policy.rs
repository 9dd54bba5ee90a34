//! Deterministic policy constraints and their evaluation.

use serde::{Deserialize, Serialize};
use tauplus_config::Domain;

use crate::catalog::ToolCatalog;
use crate::trajectory::Trajectory;
use crate::turn::{Role, Turn};

const AFFIRMATIVE_WORDS: &[&str] = &[
  "yes",
  "yeah",
  "yep",
  "confirm",
  "confirmed",
  "proceed",
  "correct",
];

const NEGATIONS: &[&str] = &["no", "not", "don't", "dont", "never", "nope", "wait", "stop"];

/// Words before a keyword that may negate it.
const NEGATION_WINDOW: usize = 3;

const SUBJECTIVE_PHRASES: &[&str] = &[
  "i recommend",
  "i would recommend",
  "if i were you",
  "i think you should",
];

/// A single checkable policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConstraint {
  /// Explicit user confirmation must precede each call of these tools.
  RequireConfirmation { tools: Vec<String> },
  /// The agent must never say any of these phrases.
  ForbiddenPhrases { phrases: Vec<String> },
  /// The tool must not be called at all.
  ForbiddenTool { name: String },
  /// Messages containing the phrase must be backed by a prior successful lookup.
  GroundedClaims { phrase: String },
  /// Upper bound on calls of a tool.
  MaxToolCalls { name: String, max: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
  pub turn_index: usize,
  pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyStatus {
  NotApplicable,
  Satisfied,
  Violated(Vec<Violation>),
}

impl PolicyStatus {
  pub fn is_applicable(&self) -> bool {
    !matches!(self, PolicyStatus::NotApplicable)
  }

  pub fn violations(&self) -> &[Violation] {
    match self {
      PolicyStatus::Violated(v) => v,
      _ => &[],
    }
  }
}

/// Result of evaluating one constraint against a trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyCheck<'a> {
  pub constraint: &'a PolicyConstraint,
  pub status: PolicyStatus,
}

impl PolicyConstraint {
  /// The policy set that applies when a task does not list its own.
  pub fn domain_defaults(domain: Domain) -> Vec<PolicyConstraint> {
    let catalog = ToolCatalog::for_domain(domain);
    let confirm = catalog
      .consequential
      .iter()
      .filter(|tool| **tool != "send_certificate")
      .map(|tool| tool.to_string())
      .collect();

    vec![
      PolicyConstraint::RequireConfirmation { tools: confirm },
      PolicyConstraint::ForbiddenPhrases {
        phrases: SUBJECTIVE_PHRASES.iter().map(|p| p.to_string()).collect(),
      },
      PolicyConstraint::GroundedClaims {
        phrase: "based on our records".to_string(),
      },
    ]
  }

  /// Short human-readable name used in error descriptions.
  pub fn label(&self) -> String {
    match self {
      PolicyConstraint::RequireConfirmation { .. } => {
        "explicit confirmation before consequential actions".to_string()
      }
      PolicyConstraint::ForbiddenPhrases { .. } => "no subjective recommendations".to_string(),
      PolicyConstraint::ForbiddenTool { name } => format!("tool `{name}` is not permitted"),
      PolicyConstraint::GroundedClaims { phrase } => {
        format!("claims \"{phrase}\" must be grounded in a lookup")
      }
      PolicyConstraint::MaxToolCalls { name, max } => format!("at most {max} call(s) of `{name}`"),
    }
  }

  pub fn check(&self, trajectory: &Trajectory) -> PolicyStatus {
    match self {
      PolicyConstraint::RequireConfirmation { tools } => check_confirmation(tools, trajectory),
      PolicyConstraint::ForbiddenPhrases { phrases } => check_phrases(phrases, trajectory),
      PolicyConstraint::ForbiddenTool { name } => {
        let violations: Vec<_> = trajectory
          .tool_calls()
          .filter(|(_, call)| call.name == *name)
          .map(|(index, _)| Violation {
            turn_index: index,
            detail: format!("called forbidden tool `{name}`"),
          })
          .collect();
        status_from(violations)
      }
      PolicyConstraint::GroundedClaims { phrase } => check_grounded(phrase, trajectory),
      PolicyConstraint::MaxToolCalls { name, max } => {
        let calls: Vec<usize> = trajectory
          .tool_calls()
          .filter(|(_, call)| call.name == *name)
          .map(|(index, _)| index)
          .collect();
        if calls.is_empty() {
          return PolicyStatus::NotApplicable;
        }
        let violations = calls
          .iter()
          .skip(*max as usize)
          .map(|index| Violation {
            turn_index: *index,
            detail: format!("`{name}` called more than {max} time(s)"),
          })
          .collect();
        status_from(violations)
      }
    }
  }
}

/// Evaluate every constraint, preserving constraint order.
pub fn check_policies<'a>(
  constraints: &'a [PolicyConstraint],
  trajectory: &Trajectory,
) -> Vec<PolicyCheck<'a>> {
  constraints
    .iter()
    .map(|constraint| PolicyCheck {
      constraint,
      status: constraint.check(trajectory),
    })
    .collect()
}

/// Whether a user utterance reads as explicit consent.
///
/// An utterance that opens with a negation never counts, and a keyword is
/// ignored when a negation appears within the few words before it.
pub fn is_affirmative(content: &str) -> bool {
  let lowered = content.to_lowercase().replace('\u{2019}', "'");
  let words: Vec<&str> = lowered
    .split(|c: char| !(c.is_alphanumeric() || c == '\''))
    .filter(|word| !word.is_empty())
    .collect();

  if words.first().is_some_and(|word| NEGATIONS.contains(word)) {
    return false;
  }
  words.iter().enumerate().any(|(index, word)| {
    let keyword = AFFIRMATIVE_WORDS.contains(word)
      || (*word == "go" && words.get(index + 1) == Some(&"ahead"));
    keyword
      && !words[index.saturating_sub(NEGATION_WINDOW)..index]
        .iter()
        .any(|previous| NEGATIONS.contains(previous))
  })
}

fn status_from(violations: Vec<Violation>) -> PolicyStatus {
  if violations.is_empty() {
    PolicyStatus::Satisfied
  } else {
    PolicyStatus::Violated(violations)
  }
}

fn check_confirmation(tools: &[String], trajectory: &Trajectory) -> PolicyStatus {
  let mut applicable = false;
  let mut violations = Vec::new();

  for (index, call) in trajectory.tool_calls() {
    if !tools.iter().any(|t| *t == call.name) {
      continue;
    }
    applicable = true;

    let confirmed = trajectory.turns[..index]
      .iter()
      .rev()
      .find_map(|turn| match turn {
        Turn::Message(m) if m.role == Role::User => Some(is_affirmative(&m.content)),
        _ => None,
      })
      .unwrap_or(false);

    if !confirmed {
      violations.push(Violation {
        turn_index: index,
        detail: format!("`{}` called without explicit user confirmation", call.name),
      });
    }
  }

  if applicable {
    status_from(violations)
  } else {
    PolicyStatus::NotApplicable
  }
}

fn check_phrases(phrases: &[String], trajectory: &Trajectory) -> PolicyStatus {
  let lowered: Vec<String> = phrases.iter().map(|p| p.to_lowercase()).collect();
  let violations = trajectory
    .messages()
    .filter(|(_, m)| m.role == Role::Agent)
    .filter_map(|(index, m)| {
      let content = m.content.to_lowercase();
      lowered
        .iter()
        .find(|phrase| content.contains(phrase.as_str()))
        .map(|phrase| Violation {
          turn_index: index,
          detail: format!("agent said \"{phrase}\""),
        })
    })
    .collect();
  status_from(violations)
}

fn check_grounded(phrase: &str, trajectory: &Trajectory) -> PolicyStatus {
  let phrase = phrase.to_lowercase();
  let mut applicable = false;
  let mut grounded = false;
  let mut violations = Vec::new();

  for (index, turn) in trajectory.turns.iter().enumerate() {
    match turn {
      Turn::ToolCall(call) if call.outcome.is_success() => grounded = true,
      Turn::Message(m) if m.role == Role::Agent && m.content.to_lowercase().contains(&phrase) => {
        applicable = true;
        if !grounded {
          violations.push(Violation {
            turn_index: index,
            detail: format!("\"{phrase}\" stated before any successful lookup"),
          });
        }
      }
      _ => {}
    }
  }

  if applicable {
    status_from(violations)
  } else {
    PolicyStatus::NotApplicable
  }
}
