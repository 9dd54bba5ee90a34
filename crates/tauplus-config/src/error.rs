use thiserror::Error;

/// Errors raised while loading or validating the harness configuration.
///
/// These are the only errors that are fatal at startup; everything that
/// happens inside an attempt is recorded instead of propagated.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("unknown domain: {0}")]
  UnknownDomain(String),

  #[error("scoring weights must sum to 1.0, got {sum}")]
  WeightsSum { sum: f64 },

  #[error("scoring weight `{name}` must lie in [0, 1], got {value}")]
  WeightRange { name: &'static str, value: f64 },

  #[error("invalid efficiency band `{band}`: {message}")]
  InvalidBand { band: &'static str, message: String },

  #[error("invalid value for `{field}`: {message}")]
  InvalidValue { field: &'static str, message: String },

  #[error("invalid retry policy: {0}")]
  InvalidRetry(String),

  #[error("invalid judge endpoint `{endpoint}`: {source}")]
  InvalidEndpoint {
    endpoint: String,
    #[source]
    source: url::ParseError,
  },

  #[error("failed to read config file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config: {0}")]
  Parse(#[from] serde_json::Error),
}
