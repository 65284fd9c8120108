use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one batch item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub original_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionResult {
    pub fn converted(original_name: &str, output_path: PathBuf) -> Self {
        Self {
            original_name: original_name.to_string(),
            output_path: Some(output_path),
            success: true,
            error: None,
        }
    }

    pub fn failed(original_name: &str, error: impl ToString) -> Self {
        Self {
            original_name: original_name.to_string(),
            output_path: None,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub archive: PathBuf,
    /// One per upload, in upload order.
    pub results: Vec<ConversionResult>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
