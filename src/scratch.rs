use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owns every temporary artifact created for one request and deletes them
/// all when dropped, whichever way the request ends.
///
/// Paths are registered before the file is created, so a half-written upload
/// or an output the engine never finished is still covered. Paths that do
/// not exist at drop time are skipped silently.
#[derive(Debug, Default)]
pub struct Scratch {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_file(&mut self, path: impl Into<PathBuf>) {
        self.files.push(path.into());
    }

    pub fn track_dir(&mut self, path: impl Into<PathBuf>) {
        self.dirs.push(path.into());
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Deletes everything now, on the calling thread. Calling it twice is
    /// harmless.
    pub fn cleanup(&mut self) {
        remove_all(std::mem::take(&mut self.files), std::mem::take(&mut self.dirs));
    }
}

impl Drop for Scratch {
    /// Inside a tokio runtime the deletion moves to the blocking pool, so a
    /// large media directory never stalls the request-handling thread.
    fn drop(&mut self) {
        if self.files.is_empty() && self.dirs.is_empty() {
            return;
        }
        let files = std::mem::take(&mut self.files);
        let dirs = std::mem::take(&mut self.dirs);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_all(files, dirs));
            }
            Err(_) => remove_all(files, dirs),
        }
    }
}

fn remove_all(files: Vec<PathBuf>, dirs: Vec<PathBuf>) {
    for path in files {
        remove(&path, std::fs::remove_file(&path));
    }
    for path in dirs {
        remove(&path, std::fs::remove_dir_all(&path));
    }
}

fn remove(path: &Path, res: std::io::Result<()>) {
    match res {
        Ok(()) => debug!("removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("cleanup failed for {}: {e}", path.display()),
    }
}
