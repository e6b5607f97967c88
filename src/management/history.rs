use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;

use super::store::{StoreError, write_atomic};
use crate::types::{HistoryEntry, TrackRecord};

/// Append-only download history, persisted as a JSON array.
///
/// Only the most recent entry may be changed after creation, through
/// [`HistoryManager::set_last_entry_interrupted`].
pub struct HistoryManager {
    path: PathBuf,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryManager {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match async_fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::IoError(e)),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn add_entry(
        &self,
        source: &str,
        tracks: TrackRecord,
        name: Option<&str>,
        error: Option<&str>,
    ) -> Result<HistoryEntry, StoreError> {
        let (tracks, count) = match tracks {
            TrackRecord::List(list) => {
                let count = list.len();
                (list, count)
            }
            TrackRecord::Count(count) => (Vec::new(), count),
        };

        let entry = HistoryEntry {
            timestamp: Utc::now(),
            source: source.to_string(),
            name: name.map(str::to_string),
            tracks,
            count,
            error: error.map(str::to_string),
            interrupted: None,
        };

        let mut entries = self.entries.lock().await;
        entries.push(entry.clone());
        if let Err(e) = self.persist(&entries).await {
            entries.pop();
            return Err(e);
        }
        Ok(entry)
    }

    /// Flags the most recent entry when it was recorded for `source`.
    /// Returns whether an entry was flagged.
    pub async fn set_last_entry_interrupted(
        &self,
        source: &str,
        interrupted: bool,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(last) = entries.last_mut().filter(|e| e.source == source) else {
            return Ok(false);
        };

        let previous = last.clone();
        last.interrupted = Some(interrupted);
        if let Some(error) = error {
            last.error = Some(error.to_string());
        }

        if let Err(e) = self.persist(&entries).await {
            if let Some(last) = entries.last_mut() {
                *last = previous;
            }
            return Err(e);
        }
        Ok(true)
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    /// Entries recorded for one source, oldest first.
    pub async fn find_by_source(&self, source: &str) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        self.persist(&[]).await?;
        entries.clear();
        Ok(())
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, json.as_bytes()).await?;
        Ok(())
    }
}
