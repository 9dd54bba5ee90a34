use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorFamily {
  PolicyInterpretation,
  ToolUsage,
  ConversationFlow,
  ContextUnderstanding,
  System,
}

impl ErrorFamily {
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorFamily::PolicyInterpretation => "policy_interpretation",
      ErrorFamily::ToolUsage => "tool_usage",
      ErrorFamily::ConversationFlow => "conversation_flow",
      ErrorFamily::ContextUnderstanding => "context_understanding",
      ErrorFamily::System => "system",
    }
  }
}

impl fmt::Display for ErrorFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Deviation categories, grouped into families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
  RigidInterpretation,
  PolicyViolation,
  ContextMisunderstanding,
  WrongArguments,
  MissingTools,
  ToolFailure,
  PrematureTransfer,
  GoalPartialCompletion,
  InefficientFlow,
  UserIntentMisunderstanding,
  AmbiguousRequestHandling,
  RuntimeError,
  EnvironmentError,
}

impl ErrorCategory {
  pub const ALL: [ErrorCategory; 13] = [
    ErrorCategory::RigidInterpretation,
    ErrorCategory::PolicyViolation,
    ErrorCategory::ContextMisunderstanding,
    ErrorCategory::WrongArguments,
    ErrorCategory::MissingTools,
    ErrorCategory::ToolFailure,
    ErrorCategory::PrematureTransfer,
    ErrorCategory::GoalPartialCompletion,
    ErrorCategory::InefficientFlow,
    ErrorCategory::UserIntentMisunderstanding,
    ErrorCategory::AmbiguousRequestHandling,
    ErrorCategory::RuntimeError,
    ErrorCategory::EnvironmentError,
  ];

  pub fn family(&self) -> ErrorFamily {
    match self {
      ErrorCategory::RigidInterpretation
      | ErrorCategory::PolicyViolation
      | ErrorCategory::ContextMisunderstanding => ErrorFamily::PolicyInterpretation,
      ErrorCategory::WrongArguments | ErrorCategory::MissingTools | ErrorCategory::ToolFailure => {
        ErrorFamily::ToolUsage
      }
      ErrorCategory::PrematureTransfer
      | ErrorCategory::GoalPartialCompletion
      | ErrorCategory::InefficientFlow => ErrorFamily::ConversationFlow,
      ErrorCategory::UserIntentMisunderstanding | ErrorCategory::AmbiguousRequestHandling => {
        ErrorFamily::ContextUnderstanding
      }
      ErrorCategory::RuntimeError | ErrorCategory::EnvironmentError => ErrorFamily::System,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorCategory::RigidInterpretation => "rigid_interpretation",
      ErrorCategory::PolicyViolation => "policy_violation",
      ErrorCategory::ContextMisunderstanding => "context_misunderstanding",
      ErrorCategory::WrongArguments => "wrong_arguments",
      ErrorCategory::MissingTools => "missing_tools",
      ErrorCategory::ToolFailure => "tool_failure",
      ErrorCategory::PrematureTransfer => "premature_transfer",
      ErrorCategory::GoalPartialCompletion => "goal_partial_completion",
      ErrorCategory::InefficientFlow => "inefficient_flow",
      ErrorCategory::UserIntentMisunderstanding => "user_intent_misunderstanding",
      ErrorCategory::AmbiguousRequestHandling => "ambiguous_request_handling",
      ErrorCategory::RuntimeError => "runtime_error",
      ErrorCategory::EnvironmentError => "environment_error",
    }
  }

  /// Default remediation hint for the category.
  pub fn suggested_fix(&self) -> &'static str {
    match self {
      ErrorCategory::RigidInterpretation => "Review policy interpretation and consider edge cases",
      ErrorCategory::PolicyViolation => {
        "Follow the domain policy and avoid subjective recommendations"
      }
      ErrorCategory::ContextMisunderstanding => {
        "Re-read the request against the policy before refusing"
      }
      ErrorCategory::WrongArguments => "Check tool parameters against the user's stated details",
      ErrorCategory::MissingTools => {
        "Ensure all required actions are executed in the correct sequence"
      }
      ErrorCategory::ToolFailure => "Verify tool parameters and retry with correct arguments",
      ErrorCategory::PrematureTransfer => {
        "Try alternative approaches before transferring to a human"
      }
      ErrorCategory::GoalPartialCompletion => {
        "Review task requirements and ensure all actions are completed"
      }
      ErrorCategory::InefficientFlow => "Reduce redundant turns and repeated lookups",
      ErrorCategory::UserIntentMisunderstanding => {
        "Ask clarifying questions to better understand user intent"
      }
      ErrorCategory::AmbiguousRequestHandling => "Resolve ambiguous requests before acting on them",
      ErrorCategory::RuntimeError => "Check system configuration and error handling",
      ErrorCategory::EnvironmentError => {
        "Investigate the tool backend; the failure is outside the agent"
      }
    }
  }
}

impl fmt::Display for ErrorCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub const ALL: [Severity; 4] = [
    Severity::Low,
    Severity::Medium,
    Severity::High,
    Severity::Critical,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Low => "low",
      Severity::Medium => "medium",
      Severity::High => "high",
      Severity::Critical => "critical",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One detected deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
  pub category: ErrorCategory,
  pub severity: Severity,
  pub description: String,
  pub root_cause: String,
  pub suggested_fix: String,
  /// In [0, 1].
  pub confidence: f64,
  /// Turn that triggered the detection, when it is local to one turn.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub turn_index: Option<usize>,
}

impl ErrorRecord {
  pub fn new(category: ErrorCategory, severity: Severity, confidence: f64) -> Self {
    Self {
      category,
      severity,
      description: String::new(),
      root_cause: String::new(),
      suggested_fix: category.suggested_fix().to_string(),
      confidence: confidence.clamp(0.0, 1.0),
      turn_index: None,
    }
  }

  pub fn describe(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn because(mut self, root_cause: impl Into<String>) -> Self {
    self.root_cause = root_cause.into();
    self
  }

  pub fn at(mut self, turn_index: usize) -> Self {
    self.turn_index = Some(turn_index);
    self
  }

  pub fn family(&self) -> ErrorFamily {
    self.category.family()
  }

  /// Violated constraint for policy records, empty for everything else.
  pub fn constraint(&self) -> &str {
    match self.category {
      ErrorCategory::PolicyViolation => &self.root_cause,
      _ => "",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_category_has_a_family_and_name() {
    for category in ErrorCategory::ALL {
      let json = serde_json::to_string(&category).unwrap();
      assert_eq!(json, format!("\"{}\"", category.as_str()));
      let _ = category.family();
    }
    assert_eq!(ErrorCategory::MissingTools.family(), ErrorFamily::ToolUsage);
    assert_eq!(
      ErrorCategory::AmbiguousRequestHandling.family(),
      ErrorFamily::ContextUnderstanding
    );
  }

  #[test]
  fn severity_orders_by_impact() {
    assert!(Severity::Critical > Severity::High);
    assert!(Severity::Low < Severity::Medium);
  }

  #[test]
  fn confidence_is_clamped() {
    let record = ErrorRecord::new(ErrorCategory::ToolFailure, Severity::Low, 1.7);
    assert_eq!(record.confidence, 1.0);
  }
}
