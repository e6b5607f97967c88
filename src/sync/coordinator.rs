use std::{
    cmp::Reverse,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::Semaphore;

use super::{
    downloader::DownloadOrchestrator,
    reconciler::{self, SyncError, SyncReconciler},
};
use crate::{
    management::{HistoryManager, LibraryManager, library},
    spotify::{Catalog, GatewayError},
    status::StatusSink,
    types::{
        BatchSummary, DownloadResult, FailureReport, ItemFailure, ItemHealth, LibraryItem,
        PlaylistMeta, RemoteTrack, SyncStatus, TrackRecord,
    },
    utils,
};

/// Disk-only status checks never touch the API.
pub const STATUS_WORKERS: usize = 10;
/// Metadata refreshes share the API's rate-limit budget.
pub const REFRESH_WORKERS: usize = 5;

/// Everything one sync of one source produced.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub item: LibraryItem,
    pub result: DownloadResult,
    pub failures: FailureReport,
}

/// One row of the library status view.
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub group: String,
    pub item: LibraryItem,
    pub health: Result<ItemHealth, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub total: usize,
    pub refreshed: usize,
    pub skipped: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

/// A playlist on the user's profile with how often it was batch-synced.
#[derive(Debug, Clone)]
pub struct ProfilePlaylist {
    pub meta: PlaylistMeta,
    pub source_id: String,
    pub usage: u64,
}

/// Drives reconciliations for single items and whole batches.
pub struct SyncCoordinator {
    library: Arc<LibraryManager>,
    history: Arc<HistoryManager>,
    reconciler: Arc<SyncReconciler>,
    downloader: Arc<DownloadOrchestrator>,
    catalog: Option<Arc<dyn Catalog>>,
    user_id: Option<String>,
}

impl SyncCoordinator {
    pub fn new(
        library: Arc<LibraryManager>,
        history: Arc<HistoryManager>,
        reconciler: Arc<SyncReconciler>,
        downloader: Arc<DownloadOrchestrator>,
        catalog: Option<Arc<dyn Catalog>>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            library,
            history,
            reconciler,
            downloader,
            catalog,
            user_id,
        }
    }

    pub fn library(&self) -> &LibraryManager {
        &self.library
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn reconciler(&self) -> &SyncReconciler {
        &self.reconciler
    }

    fn catalog(&self) -> Result<&Arc<dyn Catalog>, SyncError> {
        self.catalog.as_ref().ok_or(SyncError::NoCatalog)
    }

    /// Refreshes metadata when a catalog is available, then downloads.
    ///
    /// A failed refresh is reported and the download still runs against the
    /// cached expectations; only the failure classification loses precision.
    pub async fn sync_one(
        &self,
        source_id: &str,
        sink: &dyn StatusSink,
    ) -> Result<SyncOutcome, SyncError> {
        self.downloader.reset_cancel();
        self.sync_item(source_id, sink).await
    }

    async fn sync_item(
        &self,
        source_id: &str,
        sink: &dyn StatusSink,
    ) -> Result<SyncOutcome, SyncError> {
        let source_id = utils::normalize_source_url(source_id);
        let before = self
            .library
            .get(&source_id)
            .await?
            .ok_or_else(|| SyncError::NotInLibrary(source_id.clone()))?;

        let mut remote_tracks: Vec<RemoteTrack> = Vec::new();
        if let Some(catalog) = &self.catalog {
            sink.set_status(Some(&format!("Fetching track list for {}", before.display_name)));
            match catalog.snapshot(&source_id).await {
                Ok(snapshot) => {
                    self.reconciler.apply_snapshot(&source_id, &snapshot).await?;
                    remote_tracks = snapshot.tracks;
                }
                Err(e) => sink.log(&format!("Metadata refresh failed for {}: {}", source_id, e)),
            }
        }

        if self.downloader.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let result = self.reconciler.reconcile(&source_id, sink).await?;
        let failures =
            reconciler::classify_failures(&result.failed_tracks, &remote_tracks, before.last_synced_at);
        let item = self
            .library
            .get(&source_id)
            .await?
            .ok_or_else(|| SyncError::NotInLibrary(source_id.clone()))?;

        Ok(SyncOutcome {
            item,
            result,
            failures,
        })
    }

    /// Syncs every item of the library one after the other, so the whole
    /// batch shares a single rate-limit budget. Stops early on cancellation.
    pub async fn sync_all(&self, sink: &dyn StatusSink) -> Result<BatchSummary, SyncError> {
        let items = self.library.items().await?;
        let ids: Vec<String> = items.into_iter().map(|i| i.source_id).collect();
        Ok(self.sync_batch(&ids, sink).await)
    }

    async fn sync_batch(&self, ids: &[String], sink: &dyn StatusSink) -> BatchSummary {
        let mut summary = BatchSummary {
            total: ids.len(),
            ..BatchSummary::default()
        };

        self.downloader.reset_cancel();
        for (index, source_id) in ids.iter().enumerate() {
            if self.downloader.is_cancelled() {
                break;
            }
            let label = match self.library.get(source_id).await {
                Ok(Some(item)) => item.display_name,
                _ => source_id.clone(),
            };
            sink.progress(index + 1, ids.len(), &label);

            match self.sync_item(source_id, sink).await {
                Ok(outcome) => {
                    let result = outcome.result;
                    if result.crashed || !result.succeeded {
                        summary.failures.push(ItemFailure {
                            name: label,
                            message: result
                                .error_message
                                .unwrap_or_else(|| "Sync failed".to_string()),
                        });
                    } else if !result.new_tracks.is_empty() {
                        summary.synced_items += 1;
                        summary.new_tracks.extend(result.new_tracks);
                    }
                }
                Err(e) => summary.failures.push(ItemFailure {
                    name: label,
                    message: e.to_string(),
                }),
            }
        }

        sink.set_status(None);
        summary
    }

    /// Classifies every item from disk with a pool of [`STATUS_WORKERS`].
    pub async fn check_statuses(&self, sink: &dyn StatusSink) -> Result<Vec<ItemReport>, SyncError> {
        let tree = self.library.tree().await?;
        let items: Vec<(String, LibraryItem)> = library::flatten_with_groups(&tree)
            .into_iter()
            .map(|(group, item)| (group, item.clone()))
            .collect();

        let semaphore = Arc::new(Semaphore::new(STATUS_WORKERS));
        let mut handles = Vec::new();
        for (_, item) in &items {
            let semaphore = semaphore.clone();
            let reconciler = self.reconciler.clone();
            let item = item.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                reconciler.health(&item).await
            }));
        }

        let total = items.len();
        let mut reports = Vec::with_capacity(total);
        for (index, ((group, item), handle)) in items.into_iter().zip(handles).enumerate() {
            sink.progress(index + 1, total, &item.display_name);
            let health = match handle.await {
                Ok(Ok(health)) => Ok(health),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(format!("status task failed: {}", e)),
            };
            reports.push(ItemReport {
                group,
                item,
                health,
            });
        }
        Ok(reports)
    }

    /// Re-fetches name, track list and remote update time for every item
    /// with a pool of [`REFRESH_WORKERS`]. Sources answering 404 are skipped;
    /// an extreme rate limit stops the batch.
    pub async fn refresh_metadata(&self, sink: &dyn StatusSink) -> Result<RefreshSummary, SyncError> {
        let catalog = self.catalog()?.clone();
        let items = self.library.items().await?;
        let mut summary = RefreshSummary {
            total: items.len(),
            ..RefreshSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(REFRESH_WORKERS));
        let mut handles = Vec::new();
        for item in &items {
            let semaphore = semaphore.clone();
            let catalog = catalog.clone();
            let source_id = item.source_id.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                catalog.snapshot(&source_id).await
            }));
        }

        let total = items.len();
        let mut handles = handles.into_iter();
        for (index, item) in items.iter().enumerate() {
            let Some(handle) = handles.next() else { break };
            sink.progress(index + 1, total, &format!("Refreshing {}", item.display_name));

            let snapshot = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    summary.failures.push(ItemFailure {
                        name: item.display_name.clone(),
                        message: format!("refresh task failed: {}", e),
                    });
                    continue;
                }
            };

            match snapshot {
                Ok(snapshot) => {
                    self.reconciler
                        .apply_snapshot(&item.source_id, &snapshot)
                        .await?;
                    summary.refreshed += 1;
                }
                Err(e) if e.is_not_found() => {
                    sink.log(&format!("Playlist skipped (404 Not Found): {}", item.source_id));
                    summary.skipped.push(item.source_id.clone());
                }
                Err(e @ GatewayError::ExtremeRateLimit { .. }) => {
                    summary.failures.push(ItemFailure {
                        name: item.display_name.clone(),
                        message: e.to_string(),
                    });
                    for rest in handles {
                        rest.abort();
                    }
                    break;
                }
                Err(e) => summary.failures.push(ItemFailure {
                    name: item.display_name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        sink.set_status(None);
        Ok(summary)
    }

    /// Adds a source by URL or URI, naming it from the catalog when no
    /// name is given.
    pub async fn add_source(
        &self,
        url: &str,
        name: Option<&str>,
        group: Option<&str>,
    ) -> Result<LibraryItem, SyncError> {
        let source_id = utils::normalize_source_url(url);
        if utils::source_kind(&source_id).is_none() {
            return Err(SyncError::Invalid(format!(
                "'{}' is not a Spotify playlist or album",
                url
            )));
        }

        let mut item = LibraryItem::new(source_id.clone(), String::new());
        match (name, &self.catalog) {
            (Some(name), _) => item.display_name = name.trim().to_string(),
            (None, Some(catalog)) => {
                let summary = catalog.summary(&source_id).await?;
                item.display_name = summary.name;
                item.expected_track_count = summary.total_tracks;
            }
            (None, None) => return Err(SyncError::NoCatalog),
        }
        if item.display_name.is_empty() {
            item.display_name = "Untitled".to_string();
        }

        self.library.add_item(item.clone(), group).await?;
        let note = format!("[MANUAL] {}", item.display_name);
        self.history
            .add_entry(&source_id, TrackRecord::Count(0), Some(&note), None)
            .await?;
        Ok(item)
    }

    pub async fn remove_source(&self, url: &str) -> Result<LibraryItem, SyncError> {
        Ok(self
            .library
            .remove_item(&utils::normalize_source_url(url))
            .await?)
    }

    /// Links an existing folder to a source so it is synced in place.
    pub async fn import_folder(&self, folder: &Path, url: &str) -> Result<LibraryItem, SyncError> {
        let source_id = utils::normalize_source_url(url);
        if utils::source_kind(&source_id).is_none() {
            return Err(SyncError::Invalid(format!(
                "'{}' is not a Spotify playlist or album",
                url
            )));
        }
        if !tokio::fs::metadata(folder).await?.is_dir() {
            return Err(SyncError::Invalid(format!(
                "'{}' is not a folder",
                folder.display()
            )));
        }
        let folder: PathBuf = tokio::fs::canonicalize(folder).await?;

        let (name, total) = match &self.catalog {
            Some(catalog) => {
                let summary = catalog.summary(&source_id).await?;
                (summary.name, summary.total_tracks)
            }
            None => (
                folder
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Imported".to_string()),
                0,
            ),
        };

        let item = if self.library.get(&source_id).await?.is_some() {
            let folder = folder.clone();
            self.library
                .update_item(&source_id, |item| {
                    item.local_path = Some(folder);
                    if total > 0 {
                        item.expected_track_count = total;
                    }
                })
                .await?
        } else {
            let mut item = LibraryItem::new(source_id.clone(), name);
            item.local_path = Some(folder.clone());
            item.expected_track_count = total;
            self.library.add_item(item.clone(), None).await?;
            item
        };

        let local = reconciler::list_audio_files(&folder).await?.len();
        let note = format!("[IMPORTED] {}", item.display_name);
        self.history
            .add_entry(&source_id, TrackRecord::Count(local), Some(&note), None)
            .await?;
        Ok(item)
    }

    /// Re-adds playlists known from the history. Returns how many were added.
    pub async fn discover(&self) -> Result<usize, SyncError> {
        let entries = self.history.entries().await;
        Ok(self.library.discover_from_history(&entries).await?)
    }

    /// Playlists on the configured profile, most used first, then by name.
    pub async fn profile_playlists(&self) -> Result<Vec<ProfilePlaylist>, SyncError> {
        let catalog = self.catalog()?;
        let user_id = self
            .user_id
            .as_deref()
            .ok_or_else(|| SyncError::Invalid("no Spotify user id configured".to_string()))?;

        let usage = self.library.usage().await?;
        let mut playlists: Vec<ProfilePlaylist> = catalog
            .user_playlists(user_id)
            .await?
            .into_iter()
            .map(|meta| {
                let source_id = format!("https://open.spotify.com/playlist/{}", meta.id);
                let usage = usage.get(&meta.id).copied().unwrap_or(0);
                ProfilePlaylist {
                    meta,
                    source_id,
                    usage,
                }
            })
            .collect();

        playlists.sort_by_key(|p| (Reverse(p.usage), p.meta.name.to_lowercase()));
        Ok(playlists)
    }

    /// Syncs a selection of profile playlists by id, adding missing ones to
    /// the library and skipping those already fully synced.
    pub async fn sync_selection(
        &self,
        selected: &[String],
        sink: &dyn StatusSink,
    ) -> Result<BatchSummary, SyncError> {
        let profile = self.profile_playlists().await?;
        let mut ids = Vec::new();
        let mut skipped = 0;

        for wanted in selected {
            let wanted_id = utils::source_spotify_id(&utils::normalize_source_url(wanted))
                .unwrap_or(wanted.as_str())
                .to_string();
            let Some(playlist) = profile.iter().find(|p| p.meta.id == wanted_id) else {
                sink.log(&format!("{} is not on the profile, skipped", wanted));
                continue;
            };

            self.library.increment_usage(&playlist.meta.id).await?;

            let item = match self.library.get(&playlist.source_id).await? {
                Some(item) => item,
                None => {
                    let mut item =
                        LibraryItem::new(playlist.source_id.clone(), playlist.meta.name.clone());
                    item.expected_track_count = playlist.meta.tracks.total;
                    self.library.add_item(item.clone(), None).await?;
                    item
                }
            };

            if matches!(self.reconciler.status(&item).await, Ok(SyncStatus::Synced { .. })) {
                sink.log(&format!("{} is already synced", item.display_name));
                skipped += 1;
                continue;
            }
            ids.push(item.source_id);
        }

        let mut summary = self.sync_batch(&ids, sink).await;
        summary.total += skipped;
        Ok(summary)
    }
}
