use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Customer-service domain a task belongs to.
///
/// Parsing an unrecognised name fails with [`ConfigError::UnknownDomain`]
/// rather than a generic serde error so startup reports it distinctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String", into = "String")]
pub enum Domain {
  Retail,
  Airline,
}

impl Domain {
  pub const ALL: [Domain; 2] = [Domain::Retail, Domain::Airline];

  pub fn as_str(&self) -> &'static str {
    match self {
      Domain::Retail => "retail",
      Domain::Airline => "airline",
    }
  }
}

impl fmt::Display for Domain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Domain {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "retail" => Ok(Domain::Retail),
      "airline" => Ok(Domain::Airline),
      other => Err(ConfigError::UnknownDomain(other.to_string())),
    }
  }
}

impl TryFrom<String> for Domain {
  type Error = ConfigError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Domain> for String {
  fn from(domain: Domain) -> Self {
    domain.as_str().to_string()
  }
}
