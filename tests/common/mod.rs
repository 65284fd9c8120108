#![allow(dead_code)]

use pandoc_web::config::Config;
use pandoc_web::engine::{ConversionJob, Engine, EngineInfo};
use pandoc_web::error::ConvertError;
use pandoc_web::pipeline::Upload;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Stands in for pandoc: copies the input behind a header line, fails on
/// inputs containing `CORRUPT`, and "succeeds" without writing anything on
/// inputs containing `NO-OUTPUT`.
#[derive(Default)]
pub struct FakeEngine {
    pub jobs: Mutex<Vec<ConversionJob>>,
    pub info: Option<EngineInfo>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<ConversionJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl Engine for FakeEngine {
    fn probe(&self) -> EngineInfo {
        self.info
            .clone()
            .unwrap_or_else(|| EngineInfo::available("3.1.9"))
    }

    fn convert(&self, job: &ConversionJob) -> Result<PathBuf, ConvertError> {
        self.jobs.lock().unwrap().push(job.clone());
        let input = std::fs::read(&job.input)?;
        let text = String::from_utf8_lossy(&input);
        if text.contains("CORRUPT") {
            return Err(ConvertError::Failed(format!(
                "could not parse {}",
                job.input.display()
            )));
        }
        if text.contains("NO-OUTPUT") {
            return Ok(job.output.clone());
        }
        let body = format!(
            "converted[{}->{}]\n{}",
            job.request.from, job.request.to, text
        );
        std::fs::write(&job.output, body)?;
        Ok(job.output.clone())
    }
}

/// Config whose scratch dirs live under a fresh temp dir.
pub fn test_config() -> (TempDir, Config) {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.paths.upload_dir = tmp.path().join("uploads").display().to_string();
    cfg.paths.output_dir = tmp.path().join("outputs").display().to_string();
    std::fs::create_dir_all(&cfg.paths.upload_dir).unwrap();
    std::fs::create_dir_all(&cfg.paths.output_dir).unwrap();
    (tmp, cfg)
}

pub fn write_upload(cfg: &Config, original_name: &str, content: &str) -> Upload {
    let path = Path::new(&cfg.paths.upload_dir).join(format!("up-{}", next_id()));
    std::fs::write(&path, content).unwrap();
    Upload {
        original_name: original_name.to_string(),
        path,
    }
}

fn next_id() -> usize {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static N: AtomicUsize = AtomicUsize::new(0);
    N.fetch_add(1, Ordering::Relaxed)
}

pub fn dir_entries(dir: &str) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

pub const BOUNDARY: &str = "X-PANDOC-WEB-TEST-BOUNDARY";

/// Hand-rolled multipart/form-data body.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, filename, data) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Scratch deletion runs on the blocking pool inside a runtime; give it a
/// moment to land before looking.
pub async fn settled_entries(dir: &str) -> Vec<String> {
    for _ in 0..100 {
        let entries = dir_entries(dir);
        if entries.is_empty() {
            return entries;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    dir_entries(dir)
}
