//! Reporting seam between the sync engine and whatever renders it.
//!
//! The engine never prints. Everything a user might want to see (current
//! activity, raw downloader output, finished tracks, batch progress) is sent
//! to a [`StatusSink`]. The CLI renders it with spinners and colored lines;
//! tests use [`NullSink`] or a recording sink. Raw downloader output is also
//! kept in a [`DebugLog`] so failed runs can be inspected afterwards.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::Local;

pub const DEBUG_LOG_FILE: &str = "spotdl_debug.log";

pub trait StatusSink: Send + Sync {
    /// Current activity, or `None` once the activity is over.
    fn set_status(&self, _text: Option<&str>) {}

    /// One raw line of downloader output.
    fn log(&self, _line: &str) {}

    fn track_downloaded(&self, _name: &str) {}

    /// Running batch progress, `current` counting from 1.
    fn progress(&self, _current: usize, _total: usize, _label: &str) {}
}

pub struct NullSink;

impl StatusSink for NullSink {}

/// Append-only file of raw downloader lines, one timestamped line each.
pub struct DebugLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl DebugLog {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best effort; a full disk must not break a sync.
    pub fn append(&self, line: &str) {
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "[{}] {}", stamp, line.trim_end());
    }
}
