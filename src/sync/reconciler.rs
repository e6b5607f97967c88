use std::{
    collections::HashSet,
    fmt,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};

use super::{
    downloader::{CANCELLED_MESSAGE, DownloadJob, DownloadOrchestrator},
    variants,
};
use crate::{
    management::{HistoryManager, LibraryManager, StoreError, SyncClaim},
    spotify::GatewayError,
    status::StatusSink,
    types::{
        DownloadResult, FailureReport, ItemHealth, LibraryItem, RemoteTrack, SourceSnapshot,
        SyncStatus, TrackRecord,
    },
    utils,
};

#[derive(Debug)]
pub enum SyncError {
    /// Another reconciliation of the same source is still running.
    AlreadyInProgress(String),
    /// The user cancelled before the download started.
    Cancelled,
    NotInLibrary(String),
    /// Remote metadata is needed but no Spotify credentials are configured.
    NoCatalog,
    Invalid(String),
    Store(StoreError),
    Remote(GatewayError),
    Io(io::Error),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::AlreadyInProgress(id) => write!(f, "a sync of {} is already running", id),
            SyncError::Cancelled => write!(f, "{}", CANCELLED_MESSAGE),
            SyncError::NotInLibrary(id) => write!(f, "{} is not in the library", id),
            SyncError::NoCatalog => write!(
                f,
                "Spotify credentials are missing; set SPOTIFY_API_AUTH_CLIENT_ID and SPOTIFY_API_AUTH_CLIENT_SECRET"
            ),
            SyncError::Invalid(why) => write!(f, "{}", why),
            SyncError::Store(e) => write!(f, "{}", e),
            SyncError::Remote(e) => write!(f, "{}", e),
            SyncError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => SyncError::NotInLibrary(what),
            other => SyncError::Store(other),
        }
    }
}

impl From<GatewayError> for SyncError {
    fn from(err: GatewayError) -> Self {
        SyncError::Remote(err)
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err)
    }
}

/// Lower-cased base names of the audio files directly inside `dir`, with
/// their original file names. A missing folder lists as empty.
pub async fn list_audio_files(dir: &Path) -> io::Result<Vec<(String, String)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !utils::is_audio_file(&path) || !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(base) = utils::file_base_name(&path) {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            files.push((base, file_name));
        }
    }
    files.sort();
    Ok(files)
}

/// Classifies a folder against an item's expectations. Pure apart from the
/// directory listing, so repeated calls on an unchanged folder agree.
pub async fn compute_status(item: &LibraryItem, dir: &Path) -> io::Result<SyncStatus> {
    let files = list_audio_files(dir).await?;
    if files.is_empty() {
        return Ok(SyncStatus::New);
    }
    let local: HashSet<&str> = files.iter().map(|(base, _)| base.as_str()).collect();

    let (matched, total) = match &item.expected_variants {
        Some(expected) => {
            let matched = expected
                .iter()
                .filter(|set| set.iter().any(|v| local.contains(v.as_str())))
                .count();
            (matched, expected.len())
        }
        None => (files.len(), item.expected_track_count as usize),
    };

    if matched >= total {
        Ok(SyncStatus::Synced { local: files.len() })
    } else {
        Ok(SyncStatus::Partial { matched, total })
    }
}

/// Display classification. Remote updates after the last pass win over
/// everything, then a crashed run, then the disk status.
pub fn health(item: &LibraryItem, status: SyncStatus) -> ItemHealth {
    if let (Some(remote), Some(synced)) = (item.remote_updated_at, item.last_synced_at) {
        if remote > synced {
            return ItemHealth::UpdatesAvailable;
        }
    }
    if item.sync_interrupted {
        return ItemHealth::Interrupted;
    }
    match status {
        SyncStatus::New => ItemHealth::New,
        SyncStatus::Synced { .. } => ItemHealth::Synced,
        SyncStatus::Partial { matched, total } => ItemHealth::Partial { matched, total },
    }
}

/// Splits failed tracks into ones added remotely since `last_synced_at` and
/// ones that were already failing before. Without a previous pass every
/// failure counts as new.
pub fn classify_failures(
    failed: &[String],
    tracks: &[RemoteTrack],
    last_synced_at: Option<DateTime<Utc>>,
) -> FailureReport {
    let recent: Vec<&RemoteTrack> = tracks
        .iter()
        .filter(|t| match (last_synced_at, t.added_at) {
            (None, _) => true,
            (Some(since), Some(added)) => added > since,
            (Some(_), None) => false,
        })
        .collect();

    let mut report = FailureReport::default();
    for name in failed {
        let lowered = name.to_lowercase();
        let is_recent = last_synced_at.is_none()
            || recent.iter().any(|t| {
                lowered == t.display_name().to_lowercase()
                    || lowered.ends_with(&format!(" - {}", t.title.to_lowercase()))
            });
        if is_recent {
            report.new_failures.push(name.clone());
        } else {
            report.persistent_failures.push(name.clone());
        }
    }
    report
}

/// Owns the per-item sync state: status from disk, downloads, timestamps,
/// crash flags and the history entries that go with them.
pub struct SyncReconciler {
    library: Arc<LibraryManager>,
    history: Arc<HistoryManager>,
    downloader: Arc<DownloadOrchestrator>,
    output_root: PathBuf,
}

impl SyncReconciler {
    pub fn new(
        library: Arc<LibraryManager>,
        history: Arc<HistoryManager>,
        downloader: Arc<DownloadOrchestrator>,
        output_root: PathBuf,
    ) -> Self {
        Self {
            library,
            history,
            downloader,
            output_root,
        }
    }

    pub fn resolve_dir(&self, item: &LibraryItem) -> PathBuf {
        match &item.local_path {
            Some(path) => path.clone(),
            None => self.output_root.join(utils::safe_dirname(&item.display_name)),
        }
    }

    pub async fn status(&self, item: &LibraryItem) -> io::Result<SyncStatus> {
        compute_status(item, &self.resolve_dir(item)).await
    }

    pub async fn health(&self, item: &LibraryItem) -> io::Result<ItemHealth> {
        Ok(health(item, self.status(item).await?))
    }

    /// Local audio files matching none of the expected variants.
    pub async fn extras(&self, item: &LibraryItem) -> io::Result<Vec<String>> {
        let files = list_audio_files(&self.resolve_dir(item)).await?;
        let Some(expected) = &item.expected_variants else {
            return Ok(Vec::new());
        };
        let known: HashSet<&str> = expected.iter().flatten().map(String::as_str).collect();

        Ok(files
            .into_iter()
            .filter(|(base, _)| !known.contains(base.as_str()))
            .map(|(_, file_name)| file_name)
            .collect())
    }

    /// Runs one download for `source_id` and records the outcome on the
    /// item and in the history.
    pub async fn reconcile(
        &self,
        source_id: &str,
        sink: &dyn StatusSink,
    ) -> Result<DownloadResult, SyncError> {
        let item = match self.library.claim_sync(source_id).await? {
            SyncClaim::Claimed(item) => item,
            SyncClaim::Busy => return Err(SyncError::AlreadyInProgress(source_id.to_string())),
        };

        let target_dir = self.resolve_dir(&item);
        if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
            self.library
                .update_item(source_id, |item| item.sync_in_progress = false)
                .await?;
            return Err(SyncError::Io(e));
        }

        let job = DownloadJob {
            source: item.source_id.clone(),
            name: item.display_name.clone(),
            target_dir,
        };
        let result = self.downloader.run(&job, sink).await;

        let now = Utc::now();
        let crashed = result.crashed;
        self.library
            .update_item(source_id, |item| {
                item.sync_in_progress = false;
                item.sync_interrupted = crashed;
                item.last_checked_at = Some(now);
                if !crashed {
                    item.last_synced_at = Some(now);
                }
            })
            .await?;

        if crashed {
            // The downloader's own entry is best effort; when it was never
            // written the last entry belongs to another source.
            self.history
                .set_last_entry_interrupted(
                    &item.source_id,
                    true,
                    result.error_message.as_deref(),
                )
                .await?;
        } else if result.is_up_to_date() {
            let name = format!("[SYNC] {} (Up-to-date)", item.display_name);
            self.history
                .add_entry(
                    &item.source_id,
                    TrackRecord::List(Vec::new()),
                    Some(&name),
                    None,
                )
                .await?;
        }

        Ok(result)
    }

    /// Stores freshly fetched remote metadata on the item.
    ///
    /// A renamed source keeps downloading into its existing folder: when the
    /// folder derived from the old name exists, it is pinned as `local_path`.
    pub async fn apply_snapshot(
        &self,
        source_id: &str,
        snapshot: &SourceSnapshot,
    ) -> Result<LibraryItem, SyncError> {
        let current = self
            .library
            .get(source_id)
            .await?
            .ok_or_else(|| SyncError::NotInLibrary(source_id.to_string()))?;

        let pinned = if current.local_path.is_none() && current.display_name != snapshot.name {
            let old_dir = self.resolve_dir(&current);
            tokio::fs::try_exists(&old_dir)
                .await
                .unwrap_or(false)
                .then_some(old_dir)
        } else {
            None
        };

        let expected: Vec<Vec<String>> = snapshot
            .tracks
            .iter()
            .map(|t| variants::expand_sorted(&t.artists, &t.title))
            .collect();
        let now = Utc::now();

        Ok(self
            .library
            .update_item(source_id, |item| {
                if !snapshot.name.is_empty() {
                    item.display_name = snapshot.name.clone();
                }
                if pinned.is_some() {
                    item.local_path = pinned;
                }
                item.expected_track_count = expected.len() as u32;
                item.expected_variants = Some(expected);
                if snapshot.remote_updated_at.is_some() {
                    item.remote_updated_at = snapshot.remote_updated_at;
                }
                item.last_checked_at = Some(now);
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn updates_available_outranks_interrupted() {
        let mut item = LibraryItem::new("https://open.spotify.com/playlist/x", "X");
        item.last_synced_at = Some(at(1));
        item.remote_updated_at = Some(at(2));
        item.sync_interrupted = true;
        assert_eq!(
            health(&item, SyncStatus::Synced { local: 3 }),
            ItemHealth::UpdatesAvailable
        );

        item.remote_updated_at = Some(at(1));
        assert_eq!(
            health(&item, SyncStatus::Synced { local: 3 }),
            ItemHealth::Interrupted
        );
    }

    #[test]
    fn failures_split_by_added_date() {
        let tracks = vec![
            RemoteTrack {
                artists: vec!["Old".into()],
                title: "Chronic".into(),
                added_at: Some(at(1)),
            },
            RemoteTrack {
                artists: vec!["New".into()],
                title: "Fresh".into(),
                added_at: Some(at(5)),
            },
        ];
        let failed = vec!["Old - Chronic".to_string(), "New - Fresh".to_string()];

        let report = classify_failures(&failed, &tracks, Some(at(3)));
        assert_eq!(report.new_failures, vec!["New - Fresh".to_string()]);
        assert_eq!(report.persistent_failures, vec!["Old - Chronic".to_string()]);

        let first_pass = classify_failures(&failed, &tracks, None);
        assert_eq!(first_pass.new_failures.len(), 2);
    }
}
