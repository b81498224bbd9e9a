//! Append-only completion log.
//!
//! Each record occupies exactly one line. Batches are assembled in memory,
//! written with a single `write_all` and synced. A failed batch is cut back
//! off the file, so a flush either lands as whole lines or reports an error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TelemetryError};
use crate::event::CompletionRecord;

/// Open handle on `<cache_dir>/completion.log`.
#[derive(Debug)]
pub struct CompletionLog {
    path: PathBuf,
    file: File,
    /// Set when the existing file ends in a partial line.
    needs_newline: bool,
}

impl CompletionLog {
    /// Open (creating if needed) the log at `path` in append mode.
    ///
    /// The parent directory is created when absent.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TelemetryError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TelemetryError::io(&path, e))?;

        let needs_newline = ends_with_partial_line(&path).map_err(|e| TelemetryError::io(&path, e))?;
        if needs_newline {
            log::warn!(
                target: "cactus_telemetry",
                "{} ends with a partial line, terminating it before appending",
                path.display()
            );
        }

        Ok(Self {
            path,
            file,
            needs_newline,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records` as JSON lines and sync them to disk.
    ///
    /// Returns the number of lines written. An empty batch touches nothing.
    /// On failure the file is cut back to its previous length, so a retry of
    /// the same batch neither duplicates lines nor extends a torn one.
    pub fn append(&mut self, records: &[CompletionRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut batch = String::new();
        if self.needs_newline {
            batch.push('\n');
        }
        for record in records {
            batch.push_str(&record.to_json_line()?);
            batch.push('\n');
        }

        let committed_len = self
            .file
            .metadata()
            .map_err(|e| TelemetryError::io(&self.path, e))?
            .len();

        let written = self
            .file
            .write_all(batch.as_bytes())
            .and_then(|_| self.file.flush())
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            self.rollback(committed_len);
            return Err(TelemetryError::io(&self.path, e));
        }
        self.needs_newline = false;

        Ok(records.len())
    }

    /// Drop whatever a failed append left past `len`.
    fn rollback(&mut self, len: u64) {
        if let Err(e) = self.file.set_len(len) {
            log::warn!(
                target: "cactus_telemetry",
                "Failed to roll back partial write to {}: {}",
                self.path.display(),
                e
            );
            // The tail may hold a torn line; terminate it before the next record.
            self.needs_newline = true;
        }
    }

}

fn ends_with_partial_line(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
