// src/engine/sink.rs
//
// Where a finished batch goes: a single file or one archive, handed to a sink.

use crate::error::PixelShiftError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

type SinkResult<T> = std::result::Result<T, PixelShiftError>;

/// The one download a completed batch produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    /// Number of images inside; 1 for a direct download
    pub entries: usize,
}

impl Download {
    pub const ZIP_MIME: &'static str = "application/zip";

    pub fn is_archive(&self) -> bool {
        self.mime == Self::ZIP_MIME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub trait DownloadSink {
    fn deliver(&mut self, download: &Download) -> SinkResult<()>;
}

/// Keeps downloads in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub downloads: Vec<Download>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&Download> {
        self.downloads.last()
    }
}

impl DownloadSink for MemorySink {
    fn deliver(&mut self, download: &Download) -> SinkResult<()> {
        self.downloads.push(download.clone());
        Ok(())
    }
}

/// Writes each download into a directory, atomically.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&mut self, download: &Download) -> SinkResult<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PixelShiftError::file_write_failed(self.dir.display().to_string(), e))?;
        let target = self.dir.join(&download.filename);
        write_atomic(&self.dir, &target, &download.bytes)?;
        tracing::info!(
            target: "pixelshift::sink",
            path = %target.display(),
            bytes = download.len(),
            "download written"
        );
        self.written.push(target);
        Ok(())
    }
}

/// Temp file in the target directory, fsync, then rename over `target`.
fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> SinkResult<()> {
    let mut temp_file = NamedTempFile::new_in(dir)
        .map_err(|e| PixelShiftError::file_write_failed(dir.display().to_string(), e))?;
    let temp_path = temp_file.path().to_path_buf();
    temp_file
        .write_all(data)
        .map_err(|e| PixelShiftError::file_write_failed(temp_path.display().to_string(), e))?;
    temp_file
        .as_file_mut()
        .sync_all()
        .map_err(|e| PixelShiftError::file_write_failed(temp_path.display().to_string(), e))?;
    temp_file
        .persist(target)
        .map_err(|e| PixelShiftError::file_write_failed(target.display().to_string(), e.error))?;
    Ok(())
}
