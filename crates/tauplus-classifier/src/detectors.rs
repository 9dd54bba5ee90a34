//! Individual deviation detectors.
//!
//! Each detector looks at one aspect of a trajectory and reports independently;
//! the classifier merges their output.

use regex::{Regex, RegexBuilder};
use tauplus_config::EfficiencyBands;
use tauplus_trajectory::{
  GoalProgress, PolicyConstraint, PolicyStatus, Role, Task, Termination, ToolFailureKind,
  ToolOutcome, Trajectory, Transfer, Turn, arguments_match,
};

use crate::taxonomy::{ErrorCategory, ErrorRecord, Severity};

/// Shared analyses computed once per classification.
pub struct Evidence<'a> {
  pub task: &'a Task,
  pub trajectory: &'a Trajectory,
  pub success: bool,
  pub progress: GoalProgress,
  pub transfer: Option<Transfer>,
  pub bands: &'a EfficiencyBands,
}

/// A source of [`ErrorRecord`]s. Must be deterministic.
pub trait Detector: Send + Sync {
  fn name(&self) -> &'static str;

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord>;
}

/// A set of regular expressions that flag agent messages with one category.
#[derive(Debug, Clone)]
pub struct PatternRule {
  pub label: &'static str,
  pub category: ErrorCategory,
  pub severity: Severity,
  pub confidence: f64,
  patterns: Vec<Regex>,
}

impl PatternRule {
  pub fn new(
    label: &'static str,
    category: ErrorCategory,
    severity: Severity,
    confidence: f64,
    patterns: &[&str],
  ) -> Result<Self, regex::Error> {
    let patterns = patterns
      .iter()
      .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self {
      label,
      category,
      severity,
      confidence,
      patterns,
    })
  }

  fn first_match(&self, content: &str) -> Option<&Regex> {
    self.patterns.iter().find(|p| p.is_match(content))
  }
}

/// Flags agent wording that signals rigid policy reading or confusion.
#[derive(Debug, Clone)]
pub struct PatternDetector {
  rules: Vec<PatternRule>,
}

impl PatternDetector {
  pub fn new(rules: Vec<PatternRule>) -> Self {
    Self { rules }
  }

  pub fn standard() -> Result<Self, regex::Error> {
    Ok(Self::new(vec![
      PatternRule::new(
        "rigid policy wording",
        ErrorCategory::RigidInterpretation,
        Severity::Medium,
        0.8,
        &[
          r"based on our polic(y|ies)",
          r"unfortunately,? .*\bcannot\b",
          r"not possible .*\bpolicy\b",
          r"against (our|the) policy",
        ],
      )?,
      PatternRule::new(
        "confusion about the request",
        ErrorCategory::UserIntentMisunderstanding,
        Severity::Medium,
        0.8,
        &[
          r"\bi (do not|don't|did not|didn't) understand\b",
          r"\bunclear (what|which|about|request)\b",
          r"\bcould you (please )?clarify\b",
        ],
      )?,
    ]))
  }
}

impl Detector for PatternDetector {
  fn name(&self) -> &'static str {
    "patterns"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let mut records = Vec::new();
    for (index, message) in evidence.trajectory.agent_messages() {
      for rule in &self.rules {
        if let Some(pattern) = rule.first_match(&message.content) {
          records.push(
            ErrorRecord::new(rule.category, rule.severity, rule.confidence)
              .describe(format!("Detected {} in agent response", rule.label))
              .because(format!("pattern '{}' matched", pattern.as_str()))
              .at(index),
          );
        }
      }
    }
    records
  }
}

/// Reports each violated policy constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyDetector;

impl PolicyDetector {
  fn severity(constraint: &PolicyConstraint) -> Severity {
    match constraint {
      PolicyConstraint::RequireConfirmation { .. } | PolicyConstraint::ForbiddenTool { .. } => {
        Severity::High
      }
      PolicyConstraint::GroundedClaims { .. } => Severity::Medium,
      PolicyConstraint::ForbiddenPhrases { .. } | PolicyConstraint::MaxToolCalls { .. } => {
        Severity::Low
      }
    }
  }
}

impl Detector for PolicyDetector {
  fn name(&self) -> &'static str {
    "policy"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let policies = evidence.task.effective_policies();
    let mut records = Vec::new();
    for constraint in policies.iter() {
      let PolicyStatus::Violated(violations) = constraint.check(evidence.trajectory) else {
        continue;
      };
      for violation in violations {
        records.push(
          ErrorRecord::new(ErrorCategory::PolicyViolation, Self::severity(constraint), 0.9)
            .describe(violation.detail)
            .because(format!("violates policy: {}", constraint.label()))
            .at(violation.turn_index),
        );
      }
    }
    records
  }
}

/// Compares the trajectory's tool usage with the ground-truth actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalDetector;

impl Detector for GoalDetector {
  fn name(&self) -> &'static str {
    "goal"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let Evidence {
      task,
      trajectory,
      progress,
      ..
    } = evidence;
    let mut records = Vec::new();

    // An empty run is reported as a runtime failure, not as missing work.
    if trajectory.is_empty() {
      return records;
    }

    let missing = progress.missing(task);
    if !missing.is_empty() {
      records.push(
        ErrorRecord::new(ErrorCategory::MissingTools, Severity::High, 0.9)
          .describe(format!("Missing required actions: {}", missing.join(", ")))
          .because("agent did not execute every required action"),
      );
    }

    for (turn_index, action) in progress.wrong_arguments(task) {
      let actual = trajectory.turns[turn_index].as_tool_call();
      let differing: Vec<&str> = match actual {
        Some(call) if !arguments_match(&action.arguments, &call.arguments) => action
          .arguments
          .keys()
          .filter(|k| action.arguments.get(*k) != call.arguments.get(*k))
          .map(String::as_str)
          .collect(),
        _ => Vec::new(),
      };
      records.push(
        ErrorRecord::new(ErrorCategory::WrongArguments, Severity::Medium, 0.85)
          .describe(format!("`{}` called with incorrect arguments", action.name))
          .because(if differing.is_empty() {
            "arguments differ from the expected call".to_string()
          } else {
            format!("mismatched arguments: {}", differing.join(", "))
          })
          .at(turn_index),
      );
    }

    for &turn_index in &progress.extraneous {
      let name = trajectory.turns[turn_index]
        .as_tool_call()
        .map(|c| c.name.as_str())
        .unwrap_or_default();
      records.push(
        ErrorRecord::new(ErrorCategory::WrongArguments, Severity::Medium, 0.8)
          .describe(format!("Executed unnecessary action `{name}`"))
          .because("agent changed state the task did not ask to change")
          .at(turn_index),
      );
    }

    if !evidence.success
      && let Some(ratio) = progress.ratio()
      && progress.is_partial()
    {
      let severity = if ratio < 0.5 {
        Severity::High
      } else {
        Severity::Medium
      };
      records.push(
        ErrorRecord::new(ErrorCategory::GoalPartialCompletion, severity, 0.9)
          .describe(format!("Task partially completed ({:.1}% of targets)", ratio * 100.0))
          .because("agent stopped short of the goal state"),
      );
    }

    records
  }
}

/// Reports failed tool invocations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolOutcomeDetector;

impl Detector for ToolOutcomeDetector {
  fn name(&self) -> &'static str {
    "tool_outcomes"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    evidence
      .trajectory
      .tool_calls()
      .filter_map(|(index, call)| {
        let ToolOutcome::Failure { kind, message } = &call.outcome else {
          return None;
        };
        let record = match kind {
          ToolFailureKind::Backend => {
            ErrorRecord::new(ErrorCategory::EnvironmentError, Severity::High, 0.9)
              .describe(format!("Backend failure in `{}`: {message}", call.name))
              .because("tool backend raised an error independent of the arguments")
          }
          kind => {
            let exhausted = kind.is_retryable() && call.retried();
            let severity = if exhausted {
              Severity::High
            } else {
              Severity::Medium
            };
            ErrorRecord::new(ErrorCategory::ToolFailure, severity, 0.9)
              .describe(format!("Tool call `{}` failed: {message}", call.name))
              .because(if exhausted {
                format!("{kind:?} persisted after {} attempts", call.attempts)
              } else {
                format!("tool returned {kind:?}")
              })
          }
        };
        Some(record.at(index))
      })
      .collect()
  }
}

/// Reports a hand-off to a human the task did not call for.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferDetector;

impl Detector for TransferDetector {
  fn name(&self) -> &'static str {
    "transfer"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    match evidence.transfer {
      Some(transfer) if transfer.premature => vec![
        ErrorRecord::new(ErrorCategory::PrematureTransfer, Severity::High, 0.9)
          .describe("Conversation transferred to a human agent")
          .because("the task was resolvable without escalation")
          .at(transfer.turn_index),
      ],
      _ => Vec::new(),
    }
  }
}

/// Flags refusals of requests the task expected to be carried out.
#[derive(Debug, Clone)]
pub struct RefusalDetector {
  refusal: Regex,
}

impl RefusalDetector {
  pub fn new() -> Result<Self, regex::Error> {
    let refusal = RegexBuilder::new(
      r"\b(i|we) (cannot|can't|am unable to|are unable to|won't be able to)\b",
    )
    .case_insensitive(true)
    .build()?;
    Ok(Self { refusal })
  }
}

impl Detector for RefusalDetector {
  fn name(&self) -> &'static str {
    "refusal"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let catalog = evidence.task.catalog();
    let missing_mutation = evidence
      .progress
      .missing(evidence.task)
      .into_iter()
      .find(|name| catalog.is_mutating(name));
    let Some(expected) = missing_mutation else {
      return Vec::new();
    };

    evidence
      .trajectory
      .agent_messages()
      .find(|(_, m)| self.refusal.is_match(&m.content))
      .map(|(index, _)| {
        vec![
          ErrorRecord::new(ErrorCategory::ContextMisunderstanding, Severity::Medium, 0.7)
            .describe(format!("Agent refused although `{expected}` was expected"))
            .because("request judged out of policy when the policy permits it")
            .at(index),
        ]
      })
      .unwrap_or_default()
  }
}

/// Flags consequential actions taken directly on a hedged user request.
#[derive(Debug, Clone)]
pub struct AmbiguityDetector {
  hedge: Regex,
}

impl AmbiguityDetector {
  pub fn new() -> Result<Self, regex::Error> {
    let hedge = RegexBuilder::new(r"\b(maybe|not sure|either|or perhaps|i guess|whichever)\b")
      .case_insensitive(true)
      .build()?;
    Ok(Self { hedge })
  }
}

impl Detector for AmbiguityDetector {
  fn name(&self) -> &'static str {
    "ambiguity"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let catalog = evidence.task.catalog();
    let turns = &evidence.trajectory.turns;
    let mut records = Vec::new();

    for (index, call) in evidence.trajectory.tool_calls() {
      if !catalog.is_consequential(&call.name) {
        continue;
      }
      let previous_message = turns[..index].iter().rev().find_map(Turn::as_message);
      if let Some(message) = previous_message
        && message.role == Role::User
        && self.hedge.is_match(&message.content)
      {
        records.push(
          ErrorRecord::new(ErrorCategory::AmbiguousRequestHandling, Severity::Medium, 0.6)
            .describe(format!("`{}` executed on an ambiguous request", call.name))
            .because("agent acted without resolving the user's hedged request")
            .at(index),
        );
      }
    }
    records
  }
}

/// Flags conversations that run past the efficiency bands or repeat calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowDetector;

impl Detector for FlowDetector {
  fn name(&self) -> &'static str {
    "flow"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let trajectory = evidence.trajectory;
    let bands = evidence.bands;
    let mut records = Vec::new();

    let turns = trajectory.turn_count();
    if turns > bands.turns.upper {
      records.push(
        ErrorRecord::new(ErrorCategory::InefficientFlow, Severity::Low, 0.7)
          .describe(format!("{turns} conversational turns (optimal up to {})", bands.turns.upper))
          .because("conversation ran longer than needed"),
      );
    }

    let tools = trajectory.tool_call_count();
    if tools > bands.tool_calls.upper {
      records.push(
        ErrorRecord::new(ErrorCategory::InefficientFlow, Severity::Low, 0.7)
          .describe(format!("{tools} tool calls (optimal up to {})", bands.tool_calls.upper))
          .because("more tool calls than the task required"),
      );
    }

    let calls: Vec<_> = trajectory.tool_calls().collect();
    for pair in calls.windows(2) {
      let (_, previous) = pair[0];
      let (index, call) = pair[1];
      if previous.outcome.is_success()
        && previous.name == call.name
        && previous.arguments == call.arguments
      {
        records.push(
          ErrorRecord::new(ErrorCategory::InefficientFlow, Severity::Low, 0.7)
            .describe(format!("Repeated identical call to `{}`", call.name))
            .because("result of the previous identical call was already available")
            .at(index),
        );
      }
    }
    records
  }
}

/// Reports attempts cut short by agent, user or environment errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeDetector;

impl Detector for RuntimeDetector {
  fn name(&self) -> &'static str {
    "runtime"
  }

  fn detect(&self, evidence: &Evidence<'_>) -> Vec<ErrorRecord> {
    let termination = &evidence.trajectory.termination;
    let record = match termination {
      Termination::AgentTimeout
      | Termination::AgentError { .. }
      | Termination::UserTimeout
      | Termination::UserError { .. } => {
        ErrorRecord::new(ErrorCategory::RuntimeError, Severity::Critical, 1.0)
          .describe(format!("System error occurred: {}", termination.describe()))
          .because("runtime failure during task execution")
      }
      Termination::EnvironmentError { .. } => {
        ErrorRecord::new(ErrorCategory::EnvironmentError, Severity::Critical, 1.0)
          .describe(format!("Environment failure: {}", termination.describe()))
          .because("tool environment failed independently of the conversation")
      }
      _ => return Vec::new(),
    };
    vec![record]
  }
}
