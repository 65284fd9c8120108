use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// A file to place in the archive under `name`.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub source: PathBuf,
}

/// Writes a deflate zip at `dest` with one entry per item, in order.
/// Zero entries is valid and yields an empty archive.
pub fn write_zip(dest: &Path, entries: &[ArchiveEntry]) -> Result<()> {
    let file =
        File::create(dest).with_context(|| format!("create archive: {}", dest.display()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .with_context(|| format!("start archive entry: {}", entry.name))?;
        let mut src = File::open(&entry.source)
            .with_context(|| format!("open converted output: {}", entry.source.display()))?;
        std::io::copy(&mut src, &mut zip)
            .with_context(|| format!("write archive entry: {}", entry.name))?;
    }

    let mut out = zip.finish().with_context(|| "finalize archive")?;
    out.flush().with_context(|| "flush archive")?;
    Ok(())
}

/// Hands out entry names, suffixing repeats: `a.html`, `a-2.html`, `a-3.html`.
#[derive(Debug, Default)]
pub struct EntryNamer {
    taken: HashSet<String>,
}

impl EntryNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&mut self, stem: &str, ext: &str) -> String {
        let mut name = format!("{stem}.{ext}");
        let mut n = 2;
        while self.taken.contains(&name) {
            name = format!("{stem}-{n}.{ext}");
            n += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}
