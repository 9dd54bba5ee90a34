use std::fmt;

use serde::{Deserialize, Serialize};

/// The party responsible for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultAuthor {
  User,
  Agent,
  Environment,
}

impl FaultAuthor {
  pub const ALL: [FaultAuthor; 3] =
    [FaultAuthor::User, FaultAuthor::Agent, FaultAuthor::Environment];

  pub fn as_str(&self) -> &'static str {
    match self {
      FaultAuthor::User => "user",
      FaultAuthor::Agent => "agent",
      FaultAuthor::Environment => "environment",
    }
  }
}

impl fmt::Display for FaultAuthor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What kind of mistake an agent fault was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultType {
  CalledWrongTool,
  UsedWrongToolArgument,
  GoalPartiallyCompleted,
  TimeoutOrApiError,
  Other,
}

impl FaultType {
  pub const ALL: [FaultType; 5] = [
    FaultType::CalledWrongTool,
    FaultType::UsedWrongToolArgument,
    FaultType::GoalPartiallyCompleted,
    FaultType::TimeoutOrApiError,
    FaultType::Other,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      FaultType::CalledWrongTool => "called_wrong_tool",
      FaultType::UsedWrongToolArgument => "used_wrong_tool_argument",
      FaultType::GoalPartiallyCompleted => "goal_partially_completed",
      FaultType::TimeoutOrApiError => "timeout_or_api_error",
      FaultType::Other => "other",
    }
  }
}

impl fmt::Display for FaultType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Who is at fault. Only agent faults carry a fault type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "author", rename_all = "snake_case")]
pub enum Fault {
  User,
  Agent { fault_type: FaultType },
  Environment,
}

impl Fault {
  pub fn agent(fault_type: FaultType) -> Self {
    Fault::Agent { fault_type }
  }

  pub fn author(&self) -> FaultAuthor {
    match self {
      Fault::User => FaultAuthor::User,
      Fault::Agent { .. } => FaultAuthor::Agent,
      Fault::Environment => FaultAuthor::Environment,
    }
  }

  pub fn fault_type(&self) -> Option<FaultType> {
    match self {
      Fault::Agent { fault_type } => Some(*fault_type),
      _ => None,
    }
  }
}

impl fmt::Display for Fault {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Fault::Agent { fault_type } => write!(f, "agent ({fault_type})"),
      other => f.write_str(other.author().as_str()),
    }
  }
}

/// A judge's verdict before it is stamped with the judge's identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
  pub fault: Fault,
  pub description: String,
  pub confidence: f64,
}

impl Judgment {
  pub fn new(fault: Fault, description: impl Into<String>, confidence: f64) -> Self {
    Self {
      fault,
      description: description.into(),
      confidence: confidence.clamp(0.0, 1.0),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultAssignment {
  #[serde(flatten)]
  pub fault: Fault,
  pub description: String,
  pub confidence: f64,
  /// Name of the judge that produced the assignment.
  pub judge: String,
  /// Produced by a model; informative, not authoritative.
  #[serde(default)]
  pub advisory: bool,
}

/// Outcome of fault attribution for one failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Attribution {
  Assigned(FaultAssignment),
  Unattributed { reason: String },
}

impl Attribution {
  pub fn assignment(&self) -> Option<&FaultAssignment> {
    match self {
      Attribution::Assigned(assignment) => Some(assignment),
      Attribution::Unattributed { .. } => None,
    }
  }

  pub fn is_unattributed(&self) -> bool {
    matches!(self, Attribution::Unattributed { .. })
  }
}

impl fmt::Display for Attribution {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Attribution::Assigned(a) => {
        write!(f, "Auto Error Identification: {} ({:.2})", a.fault, a.confidence)
      }
      Attribution::Unattributed { .. } => f.write_str("Auto Error Identification: Not available"),
    }
  }
}
