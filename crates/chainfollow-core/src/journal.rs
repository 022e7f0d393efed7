//! Progress journal: the restart-safe record of the last processed round.
//!
//! The journal is a text file with one decimal round per line. Every record is
//! appended and synced before the engine moves on. Once the number of appends
//! passes the rotation threshold, the latest round is written to a fresh file
//! which then atomically replaces the journal, so the file never grows without
//! bound and readers only ever see one well-known path.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::block::Round;

/// Bytes read from the end of the file on recovery.
const RECOVERY_TAIL_BYTES: u64 = 100;

/// Default number of appends before the journal is rotated.
pub const DEFAULT_ROTATE_AFTER: u64 = 100_000;

pub struct ProgressJournal {
    path: Option<PathBuf>,
    file: Option<File>,
    writes: u64,
    rotate_after: u64,
    last: Option<Round>,
}

impl ProgressJournal {
    /// A journal at `path`; `None` disables recording and recovery.
    pub fn new(path: Option<PathBuf>, rotate_after: u64) -> Self {
        Self {
            path,
            file: None,
            writes: 0,
            rotate_after,
            last: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The last round recorded or recovered by this journal.
    pub fn last(&self) -> Option<Round> {
        self.last
    }

    /// Read the last complete line of the journal.
    ///
    /// A trailing line without a newline is a torn write and is ignored. Any
    /// failure means "no checkpoint" and is logged, never returned.
    pub fn recover(&mut self) -> Option<Round> {
        let path = self.path.as_deref()?;
        match read_last_round(path) {
            Ok(Some(round)) => {
                tracing::info!(round, path = %path.display(), "recovered progress");
                self.last = Some(round);
                Some(round)
            }
            Ok(None) => {
                tracing::info!(path = %path.display(), "could not recover progress: no complete entry");
                None
            }
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "could not recover progress");
                None
            }
        }
    }

    /// Durably record `round` as processed.
    pub fn record(&mut self, round: Round) -> io::Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        if let Some(last) = self.last {
            if round < last {
                tracing::warn!(round, last, "refusing to move progress backwards");
                return Ok(());
            }
        }

        if self.writes > self.rotate_after {
            self.rotate(&path, round)?;
            self.last = Some(round);
            return Ok(());
        }

        if self.file.is_none() {
            self.file = Some(OpenOptions::new().create(true).append(true).open(&path)?);
            self.writes = 0;
        }
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{round}")?;
            file.flush()?;
            file.sync_data()?;
        }
        self.writes += 1;
        self.last = Some(round);
        Ok(())
    }

    /// Flush and release the file handle. Safe to call more than once.
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Replace the journal with a one-line file holding `round`.
    fn rotate(&mut self, path: &Path, round: Round) -> io::Result<()> {
        self.close()?;

        let mut next = path.as_os_str().to_owned();
        next.push(format!("_next_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));
        let next = PathBuf::from(next);

        let mut file = OpenOptions::new().write(true).create_new(true).open(&next)?;
        writeln!(file, "{round}")?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&next, path)?;
        sync_parent_dir(path);

        tracing::debug!(round, path = %path.display(), writes = self.writes, "rotated progress journal");
        // The rotated file is reopened for append on the next record.
        self.writes = 0;
        Ok(())
    }
}

impl Drop for ProgressJournal {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close progress journal");
        }
    }
}

fn read_last_round(path: &Path) -> io::Result<Option<Round>> {
    let mut file = File::open(path)?;
    let end = file.seek(SeekFrom::End(0))?;
    let start = end.saturating_sub(RECOVERY_TAIL_BYTES);
    file.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    Ok(last_complete_round(&tail, start > 0))
}

/// Parse the last newline-terminated line of `tail`.
///
/// When the window starts mid-file its first line may be cut, so it only
/// counts if it is not the first line in the window.
fn last_complete_round(tail: &[u8], window_is_cut: bool) -> Option<Round> {
    let complete = &tail[..tail.iter().rposition(|&b| b == b'\n')? + 1];
    let text = String::from_utf8_lossy(complete);
    let mut lines: Vec<&str> = text.lines().collect();
    if window_is_cut && !lines.is_empty() {
        lines.remove(0);
    }
    let last = lines.into_iter().rev().find(|l| !l.trim().is_empty())?;
    last.trim().parse().ok()
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            tracing::debug!(error = %e, "could not sync journal directory");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
