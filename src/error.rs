use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRole {
    Source,
    Target,
}

impl fmt::Display for FormatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatRole::Source => f.write_str("source"),
            FormatRole::Target => f.write_str("target"),
        }
    }
}

/// Failures of a single conversion, from request validation down to the
/// engine subprocess.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("conversion engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("unsupported {role} format: {value:?}")]
    UnsupportedFormat { role: FormatRole, value: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("conversion timed out after {0:?}")]
    Timeout(Duration),

    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("engine output exceeded the {limit} byte capture buffer")]
    OutputOverflow { limit: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// True when the caller sent something unusable, as opposed to the
    /// engine or the host failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::UnsupportedFormat { .. } | ConvertError::InvalidOptions(_)
        )
    }
}
