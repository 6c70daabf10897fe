//! Error types for SOAP cache key derivation.

use thiserror::Error;

/// Errors surfaced by the public cache key API.
#[derive(Error, Debug)]
pub enum CacheKeyError {
    /// The request body could not be read. Fatal for the current request.
    #[error("Failed to read request body: {0}")]
    BodyRead(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problems with a single line of the rule source.
///
/// These never abort a load; the offending line or pattern is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("blank key")]
    BlankKey,

    #[error("skipped '{key}', value was not recognized: {value}")]
    UnrecognizedValue { key: String, value: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl RuleError {
    /// Short stable code for log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlankKey => "BLANK_KEY",
            Self::UnrecognizedValue { .. } => "UNRECOGNIZED_VALUE",
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
        }
    }
}
