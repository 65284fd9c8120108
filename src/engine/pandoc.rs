use super::{ConversionJob, Engine, EngineInfo};
use crate::{command::build_args, config::Config, error::ConvertError};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::{Arc, mpsc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct PandocEngine {
    cfg: Config,
}

impl PandocEngine {
    /// Never fails: a missing executable only shows up at probe or convert time,
    /// so the server can still start and report it. A configured DOCX template
    /// or stylesheet that does not exist is dropped with a warning, and pandoc
    /// falls back to its built-in one.
    pub fn new(cfg: &Config) -> Self {
        let mut cfg = cfg.clone();
        let engine = &mut cfg.engine;
        for (key, value) in [
            ("engine.reference_doc", &mut engine.reference_doc),
            ("engine.css_href", &mut engine.css_href),
        ] {
            if !value.is_empty() && !Path::new(value.as_str()).is_file() {
                warn!("{key} = {value:?} does not exist; using pandoc's default");
                value.clear();
            }
        }
        Self { cfg }
    }

    fn resolve_exe(&self) -> Result<PathBuf, ConvertError> {
        let raw = self.cfg.engine.executable.trim();
        which::which(raw).map_err(|e| {
            ConvertError::EngineUnavailable(format!("{raw} not found on PATH: {e}"))
        })
    }

    fn run(&self, args: &[OsString], timeout: Duration) -> Result<Output, ConvertError> {
        let exe = self.resolve_exe()?;
        debug!("engine run {} timeout={:?} args={:?}", exe.display(), timeout, args);

        let mut cmd = Command::new(&exe);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        isolate(&mut cmd);
        for (k, v) in &self.cfg.engine.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ConvertError::EngineUnavailable(format!("spawning {}: {e}", exe.display()))
            }
            _ => ConvertError::Io(e),
        })?;

        wait_with_timeout(&mut child, timeout, self.cfg.engine.max_capture_bytes)
    }
}

impl Engine for PandocEngine {
    fn probe(&self) -> EngineInfo {
        let timeout = Duration::from_secs(self.cfg.engine.probe_timeout_seconds.max(1));
        let output = match self.run(&["--version".into()], timeout) {
            Ok(output) => output,
            Err(err) => return EngineInfo::unavailable(err.to_string()),
        };
        if !output.status.success() {
            return EngineInfo::unavailable(failure_message(&output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_version(&stdout) {
            Some(version) => EngineInfo::available(version),
            None => EngineInfo::unavailable(format!(
                "unrecognized --version output: {}",
                stdout.lines().next().unwrap_or("").trim()
            )),
        }
    }

    fn convert(&self, job: &ConversionJob) -> Result<PathBuf, ConvertError> {
        let args = build_args(job, &self.cfg.engine);
        let output = self.run(&args, Duration::from_secs(self.cfg.engine.timeout_seconds))?;

        if !output.status.success() {
            return Err(ConvertError::Failed(failure_message(&output)));
        }

        if self.cfg.debug.keep_engine_stderr && !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("engine stderr {}: {}", job.input.display(), stderr.trim());
        }

        Ok(job.output.clone())
    }
}

/// `pandoc 3.1.9` -> `3.1.9`. Only the first line matters.
pub fn parse_version(stdout: &str) -> Option<String> {
    let first = stdout.lines().next()?.trim();
    let mut parts = first.split_whitespace();
    let name = parts.next()?;
    let version = parts.next()?;
    if !name.to_ascii_lowercase().starts_with("pandoc") {
        return None;
    }
    if !version.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(version.to_string())
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("engine exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    capture_limit: usize,
) -> Result<Output, ConvertError> {
    // Both pipes are drained on their own threads so a chatty engine can't
    // block on a full pipe while we poll for exit.
    let overflow = Arc::new(AtomicBool::new(false));
    let stdout_rx = spawn_capture(child.stdout.take(), capture_limit, overflow.clone());
    let stderr_rx = spawn_capture(child.stderr.take(), capture_limit, overflow.clone());

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }

        if overflow.load(Ordering::Relaxed) {
            warn!("engine output exceeded {} bytes; killing", capture_limit);
            terminate(child)?;
            return Err(ConvertError::OutputOverflow {
                limit: capture_limit,
            });
        }

        if start.elapsed() > timeout {
            warn!("engine process timed out after {:?}", timeout);
            terminate(child)?;
            if let Ok(Some(stderr)) = collect(&stderr_rx, DRAIN_GRACE) {
                if !stderr.is_empty() {
                    debug!(
                        "engine stderr before timeout: {}",
                        String::from_utf8_lossy(&stderr).trim()
                    );
                }
            }
            return Err(ConvertError::Timeout(timeout));
        }

        std::thread::sleep(Duration::from_millis(25));
    };

    // A helper the engine left behind can hold the pipes open after the
    // engine itself exits. That still counts against the deadline.
    let wait = timeout.saturating_sub(start.elapsed()).max(DRAIN_GRACE);
    let stdout = collect(&stdout_rx, wait)?;
    let stderr = collect(&stderr_rx, DRAIN_GRACE)?;
    let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
        warn!("engine exited but its output pipes stayed open; killing process group");
        kill_group(child);
        return Err(ConvertError::Timeout(timeout));
    };

    if overflow.load(Ordering::Relaxed) {
        return Err(ConvertError::OutputOverflow {
            limit: capture_limit,
        });
    }
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// How long to wait for the pipes to close once the engine is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Kills the engine and everything it spawned, then reaps the engine.
fn terminate(child: &mut Child) -> Result<(), ConvertError> {
    kill_group(child);
    let _ = child.kill();
    child.wait()?;
    Ok(())
}

#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

// The engine leads its own process group (see `isolate`), so the group id
// is its pid.
#[cfg(unix)]
fn kill_group(child: &Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!("killpg {pgid}: {e}");
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

type Capture = mpsc::Receiver<std::io::Result<Vec<u8>>>;

fn spawn_capture<R: Read + Send + 'static>(
    reader: Option<R>,
    limit: usize,
    overflow: Arc<AtomicBool>,
) -> Capture {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(drain(reader, limit, &overflow));
    });
    rx
}

fn drain<R: Read>(
    reader: Option<R>,
    limit: usize,
    overflow: &AtomicBool,
) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let Some(mut reader) = reader else {
        return Ok(buf);
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        if buf.len() + n > limit {
            // Keep draining so the child never stalls on a full pipe.
            overflow.store(true, Ordering::Relaxed);
            continue;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

/// `Ok(None)` if the pipe is still open after `wait`. The reader thread is
/// left to finish on its own.
fn collect(capture: &Capture, wait: Duration) -> Result<Option<Vec<u8>>, ConvertError> {
    match capture.recv_timeout(wait) {
        Ok(res) => res.map(Some).map_err(ConvertError::Io),
        Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(ConvertError::Failed(
            "output reader thread panicked".to_string(),
        )),
    }
}
