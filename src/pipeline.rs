use crate::{
    archive::{self, ArchiveEntry, EntryNamer},
    config::Config,
    engine::{ConversionJob, Engine},
    error::ConvertError,
    report::{BatchOutcome, ConversionResult},
    request::ConversionRequest,
    scratch::Scratch,
    util::{batch_stamp, safe_stem, unique_token},
};
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An uploaded file already on disk.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct Pipeline {
    cfg: Arc<Config>,
    engine: Arc<dyn Engine>,
}

impl Pipeline {
    pub fn new(cfg: Arc<Config>, engine: Arc<dyn Engine>) -> Self {
        Self { cfg, engine }
    }

    fn output_dir(&self) -> &Path {
        Path::new(&self.cfg.paths.output_dir)
    }

    /// `<stem>-<stamp>-<token>.<ext>` in the output dir. The token keeps two
    /// uploads with the same name in the same batch apart.
    pub fn derive_output_path(&self, original_name: &str, stamp: i64, req: &ConversionRequest) -> PathBuf {
        self.output_dir().join(format!(
            "{}-{}-{}.{}",
            safe_stem(original_name),
            stamp,
            unique_token(),
            req.to.file_extension()
        ))
    }

    /// Runs one upload through the engine. The output and its media dir are
    /// registered with `scratch` before the engine starts.
    pub fn convert_single(
        &self,
        upload: &Upload,
        req: &ConversionRequest,
        scratch: &mut Scratch,
    ) -> Result<PathBuf, ConvertError> {
        self.convert_stamped(upload, req, batch_stamp(), scratch)
    }

    fn convert_stamped(
        &self,
        upload: &Upload,
        req: &ConversionRequest,
        stamp: i64,
        scratch: &mut Scratch,
    ) -> Result<PathBuf, ConvertError> {
        let output = self.derive_output_path(&upload.original_name, stamp, req);
        let mut media_name = output.file_name().unwrap_or_default().to_os_string();
        media_name.push(".media");
        let media_dir = output.with_file_name(media_name);

        scratch.track_file(&output);
        scratch.track_dir(&media_dir);

        let job = ConversionJob {
            input: upload.path.clone(),
            output,
            media_dir,
            request: *req,
        };

        let started = Instant::now();
        let out = self.engine.convert(&job)?;
        debug!(
            "converted {} {}->{} in {:?}",
            upload.original_name,
            req.from,
            req.to,
            started.elapsed()
        );
        Ok(out)
    }

    /// Converts every upload in order, one at a time, and zips the successes.
    /// A failed item is recorded and skipped; it never stops the batch.
    pub fn run_batch(
        &self,
        uploads: &[Upload],
        req: &ConversionRequest,
        scratch: &mut Scratch,
    ) -> Result<BatchOutcome> {
        if uploads.is_empty() {
            bail!("no files provided");
        }

        let stamp = batch_stamp();
        let mut results = Vec::with_capacity(uploads.len());

        for (i, upload) in uploads.iter().enumerate() {
            info!(
                "batch item {}/{} {} {}->{}",
                i + 1,
                uploads.len(),
                upload.original_name,
                req.from,
                req.to
            );
            match self.convert_stamped(upload, req, stamp, scratch) {
                Ok(path) if path.is_file() => {
                    results.push(ConversionResult::converted(&upload.original_name, path))
                }
                Ok(path) => {
                    warn!("batch item {} produced no output at {}", upload.original_name, path.display());
                    results.push(ConversionResult::failed(
                        &upload.original_name,
                        "engine reported success but wrote no output",
                    ));
                }
                Err(err) => {
                    warn!("batch item {} failed: {err}", upload.original_name);
                    results.push(ConversionResult::failed(&upload.original_name, err));
                }
            }
        }

        let mut namer = EntryNamer::new();
        let entries: Vec<ArchiveEntry> = results
            .iter()
            .filter_map(|r| {
                let source = r.output_path.clone()?;
                let name = namer.claim(&safe_stem(&r.original_name), req.to.file_extension());
                Some(ArchiveEntry { name, source })
            })
            .collect();

        let archive = self
            .output_dir()
            .join(format!("batch-{}-{}.zip", stamp, unique_token()));
        scratch.track_file(&archive);
        archive::write_zip(&archive, &entries)?;

        let outcome = BatchOutcome { archive, results };
        info!(
            "batch finished: {} converted, {} failed",
            outcome.succeeded(),
            outcome.failed()
        );
        Ok(outcome)
    }
}
