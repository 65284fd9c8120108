pub mod pandoc;
pub mod types;

use crate::error::ConvertError;
use std::path::PathBuf;

pub use types::{ConversionJob, EngineInfo};

/// The external program that does the actual format translation.
pub trait Engine: Send + Sync {
    fn probe(&self) -> EngineInfo;
    /// Runs one job to completion and returns the output path. Whether the
    /// file exists afterwards is up to the engine.
    fn convert(&self, job: &ConversionJob) -> Result<PathBuf, ConvertError>;
}
