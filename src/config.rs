use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::rolling::Rotation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    /// Reads the TOML file at `path`, then applies the `PORT` override.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.with_port_override(std::env::var("PORT").ok())
    }

    /// Built-in defaults plus the `PORT` override, used when no config file exists.
    pub fn from_env() -> Result<Self> {
        Config::default().with_port_override(std::env::var("PORT").ok())
    }

    pub fn with_port_override(mut self, raw: Option<String>) -> Result<Self> {
        if let Some(raw) = raw {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.server.port = raw
                    .parse()
                    .with_context(|| format!("PORT is not a valid port number: {raw}"))?;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.timeout_seconds == 0 {
            bail!("engine.timeout_seconds must be greater than zero");
        }
        if self.engine.max_capture_bytes == 0 {
            bail!("engine.max_capture_bytes must be greater than zero");
        }
        if self.limits.max_batch_files == 0 {
            bail!("limits.max_batch_files must be greater than zero");
        }
        if self.paths.upload_dir.is_empty() || self.paths.output_dir.is_empty() {
            bail!("paths.upload_dir and paths.output_dir must be set");
        }
        self.logging.rotation()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub permissive_cors: bool,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            permissive_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub upload_dir: String,
    pub output_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".into(),
            output_dir: "outputs".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub executable: String,
    pub timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_capture_bytes: usize,
    pub pdf_engine: String,
    pub highlight_style: String,
    pub reference_doc: String,
    pub css_href: String,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            executable: "pandoc".into(),
            timeout_seconds: 120,
            probe_timeout_seconds: 10,
            max_capture_bytes: 10 * 1024 * 1024,
            pdf_engine: "xelatex".into(),
            highlight_style: "tango".into(),
            reference_doc: "templates/reference.docx".into(),
            css_href: "assets/document.css".into(),
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_file_bytes: u64,
    pub max_batch_files: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * 1024 * 1024,
            max_batch_files: 50,
        }
    }
}
impl Limits {
    /// Whole-request ceiling: a full batch of maximum-size files plus form overhead.
    pub fn max_request_bytes(&self) -> usize {
        let files = self
            .max_file_bytes
            .saturating_mul(self.max_batch_files as u64)
            .saturating_add(1024 * 1024);
        usize::try_from(files).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
    #[serde(default = "default_rotation")]
    pub rotation: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
            rotation: default_rotation(),
        }
    }
}
impl Logging {
    pub fn rotation(&self) -> Result<Rotation> {
        Ok(match self.rotation.trim().to_ascii_lowercase().as_str() {
            "minutely" => Rotation::MINUTELY,
            "hourly" => Rotation::HOURLY,
            "daily" => Rotation::DAILY,
            "never" => Rotation::NEVER,
            other => bail!(
                "logging.rotation must be minutely, hourly, daily or never, got {other:?}"
            ),
        })
    }
}

fn default_rotation() -> String {
    "daily".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_engine_stderr: bool,
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_engine_stderr: true,
            dump_effective_config: false,
        }
    }
}
