use crate::request::ConversionRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of probing for the engine. Never an error: a missing engine is
/// reported as `available: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EngineInfo {
    pub fn available(version: impl Into<String>) -> Self {
        Self {
            available: true,
            version: Some(version.into()),
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            version: None,
            error: Some(error.into()),
        }
    }
}

/// One engine invocation: where to read, where to write, where extracted
/// media may land, and what the caller asked for.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub media_dir: PathBuf,
    pub request: ConversionRequest,
}
