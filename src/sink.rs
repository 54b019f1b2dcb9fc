use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context as _;

use crate::formats::Archive;

/// Receives finished archives.
pub trait ArchiveSink: Send + Sync {
    fn save(&self, archive: Archive, filename: &str) -> anyhow::Result<()>;
}

/// Writes archives as files into one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    out_dir: PathBuf,
    force: bool,
}

impl DirectorySink {
    pub fn new(out_dir: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            force,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

impl ArchiveSink for DirectorySink {
    fn save(&self, archive: Archive, filename: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("create output dir: {}", self.out_dir.display()))?;

        let out_path = self.out_dir.join(filename);
        let mut options = OpenOptions::new();
        options.write(true);
        if self.force {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options
            .open(&out_path)
            .with_context(|| format!("open epub output: {}", out_path.display()))?;
        file.write_all(archive.as_bytes())
            .with_context(|| format!("write epub output: {}", out_path.display()))?;
        file.flush()
            .with_context(|| format!("flush epub output: {}", out_path.display()))?;

        tracing::info!(path = %out_path.display(), bytes = archive.len(), "saved epub");
        Ok(())
    }
}

/// Keeps archives in memory, in save order.
#[derive(Debug, Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, Archive)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(String, Archive)> {
        match self.saved.lock() {
            Ok(mut saved) => std::mem::take(&mut *saved),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ArchiveSink for MemorySink {
    fn save(&self, archive: Archive, filename: &str) -> anyhow::Result<()> {
        let mut saved = self
            .saved
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;
        saved.push((filename.to_owned(), archive));
        Ok(())
    }
}

/// Replaces characters that are not allowed in file names on common filesystems.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn epub_file_name(title: &str) -> String {
    format!("{}.epub", sanitize_filename(title))
}
