mod common;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use common::*;
use spotsync::{
    management::{HistoryManager, LibraryManager},
    spotify::{ApiError, Catalog, GatewayError, SourceSummary},
    status::NullSink,
    sync::{DownloadOrchestrator, SyncCoordinator, SyncError, SyncReconciler},
    types::{LibraryItem, PlaylistMeta, RemoteTrack, SourceSnapshot, TrackTotal},
};

#[derive(Clone)]
enum Reply {
    Snapshot(SourceSnapshot),
    NotFound,
    Extreme,
}

/// Catalog answering from canned replies; unknown sources are 404s.
#[derive(Default)]
struct FakeCatalog {
    replies: HashMap<String, Reply>,
    playlists: Vec<PlaylistMeta>,
    /// Cancels this downloader while a snapshot is being fetched.
    cancel: Option<Arc<DownloadOrchestrator>>,
}

impl FakeCatalog {
    fn reply(mut self, source_id: &str, reply: Reply) -> Self {
        self.replies.insert(source_id.to_string(), reply);
        self
    }

    fn lookup(&self, source_id: &str) -> Result<SourceSnapshot, GatewayError> {
        match self.replies.get(source_id) {
            Some(Reply::Snapshot(snapshot)) => Ok(snapshot.clone()),
            Some(Reply::Extreme) => Err(GatewayError::ExtremeRateLimit { retry_after: 3600 }),
            Some(Reply::NotFound) | None => Err(GatewayError::Remote(ApiError::Status {
                status: 404,
                message: "Not found.".to_string(),
            })),
        }
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn summary(&self, source_id: &str) -> Result<SourceSummary, GatewayError> {
        let snapshot = self.lookup(source_id)?;
        Ok(SourceSummary {
            name: snapshot.name,
            total_tracks: snapshot.tracks.len() as u32,
        })
    }

    async fn snapshot(&self, source_id: &str) -> Result<SourceSnapshot, GatewayError> {
        if let Some(downloader) = &self.cancel {
            downloader.terminate();
        }
        self.lookup(source_id)
    }

    async fn user_playlists(&self, _user_id: &str) -> Result<Vec<PlaylistMeta>, GatewayError> {
        Ok(self.playlists.clone())
    }
}

struct Harness {
    dir: TempDir,
    library: Arc<LibraryManager>,
    history: Arc<HistoryManager>,
    launcher: Arc<ScriptedLauncher>,
    downloader: Arc<DownloadOrchestrator>,
}

impl Harness {
    async fn new(scripts: Vec<Script>) -> Self {
        let dir = TempDir::new().unwrap();
        let library = open_library(dir.path()).await;
        let history = open_history(dir.path()).await;
        let launcher = Arc::new(ScriptedLauncher::new(scripts));
        let downloader = Arc::new(orchestrator(
            launcher.clone(),
            Arc::new(RecordingSleeper::default()),
            history.clone(),
        ));
        Self {
            dir,
            library,
            history,
            launcher,
            downloader,
        }
    }

    fn music(&self) -> PathBuf {
        self.dir.path().join("music")
    }

    fn coordinator(&self, catalog: Option<FakeCatalog>, user_id: Option<&str>) -> SyncCoordinator {
        let reconciler = Arc::new(SyncReconciler::new(
            self.library.clone(),
            self.history.clone(),
            self.downloader.clone(),
            self.music(),
        ));
        SyncCoordinator::new(
            self.library.clone(),
            self.history.clone(),
            reconciler,
            self.downloader.clone(),
            catalog.map(|c| Arc::new(c) as Arc<dyn Catalog>),
            user_id.map(str::to_string),
        )
    }

    async fn add(&self, id: &str, name: &str) -> String {
        let source_id = playlist_url(id);
        self.library
            .add_item(LibraryItem::new(source_id.clone(), name), None)
            .await
            .unwrap();
        source_id
    }
}

/// A clean run that downloads `tracks`.
fn downloads(tracks: &[&str]) -> Script {
    Script::Run {
        lines: tracks
            .iter()
            .map(|t| format!(r#"Downloaded "{}": https://music.youtube.com/watch?v=x"#, t))
            .collect(),
        exit: 0,
    }
}

fn snapshot(name: &str, tracks: &[(&str, &str)]) -> Reply {
    Reply::Snapshot(SourceSnapshot {
        name: name.to_string(),
        tracks: tracks
            .iter()
            .map(|(artist, title)| RemoteTrack {
                artists: vec![artist.to_string()],
                title: title.to_string(),
                added_at: None,
            })
            .collect(),
        remote_updated_at: None,
    })
}

async fn touch(dir: &Path, name: &str) {
    tokio::fs::create_dir_all(dir).await.unwrap();
    tokio::fs::write(dir.join(name), b"audio").await.unwrap();
}

#[tokio::test]
async fn test_sync_all_continues_past_failures_and_aggregates() {
    let h = Harness::new(vec![
        downloads(&["A - One"]),
        run(&["Retry will occur after: 86400"], 1),
        downloads(&["C - One", "C - Two"]),
        run(&[], 0),
    ])
    .await;
    h.add("a", "A").await;
    let b = h.add("b", "B").await;
    h.add("c", "C").await;
    h.add("d", "D").await;
    let coordinator = h.coordinator(None, None);
    let sink = RecordingSink::default();

    let summary = coordinator.sync_all(&sink).await.unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.synced_items, 2);
    assert_eq!(summary.new_tracks, vec!["A - One", "C - One", "C - Two"]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "B");
    assert!(summary.failures[0].message.contains("Extreme"));
    assert_eq!(
        *sink.progress.lock().unwrap(),
        vec![(1, 4), (2, 4), (3, 4), (4, 4)]
    );
    assert_eq!(h.launcher.launches(), 4);
    assert!(h.library.get(&b).await.unwrap().unwrap().sync_interrupted);
}

#[tokio::test]
async fn test_cancel_during_metadata_fetch_stops_the_batch() {
    let h = Harness::new(vec![downloads(&["A - One"]), run(&[], 0)]).await;
    let a = h.add("a", "A").await;
    h.add("b", "B").await;
    let catalog = FakeCatalog {
        cancel: Some(h.downloader.clone()),
        ..FakeCatalog::default()
    }
    .reply(&a, snapshot("A", &[("A", "One")]));
    let coordinator = h.coordinator(Some(catalog), None);
    let sink = RecordingSink::default();

    let summary = coordinator.sync_all(&sink).await.unwrap();

    assert_eq!(h.launcher.launches(), 0);
    assert_eq!(summary.synced_items, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "A");
    assert_eq!(summary.failures[0].message, "Sync cancelled.");
    assert_eq!(*sink.progress.lock().unwrap(), vec![(1, 2)]);

    let item = h.library.get(&a).await.unwrap().unwrap();
    assert!(!item.sync_in_progress);
}

#[tokio::test]
async fn test_cancel_during_metadata_fetch_skips_single_download() {
    let h = Harness::new(vec![downloads(&["A - One"])]).await;
    let a = h.add("a", "A").await;
    let catalog = FakeCatalog {
        cancel: Some(h.downloader.clone()),
        ..FakeCatalog::default()
    };
    let coordinator = h.coordinator(Some(catalog), None);

    let err = coordinator.sync_one(&a, &NullSink).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(err.to_string(), "Sync cancelled.");
    assert_eq!(h.launcher.launches(), 0);
}

#[tokio::test]
async fn test_cancel_from_an_earlier_command_does_not_leak() {
    let h = Harness::new(vec![downloads(&["A - One"])]).await;
    h.add("a", "A").await;
    let coordinator = h.coordinator(None, None);

    h.downloader.terminate();
    let summary = coordinator.sync_all(&NullSink).await.unwrap();

    assert_eq!(h.launcher.launches(), 1);
    assert_eq!(summary.synced_items, 1);
    assert!(summary.failures.is_empty());
}

#[tokio::test]
async fn test_sync_one_splits_new_and_persistent_failures() {
    let h = Harness::new(vec![run(
        &[
            "LookupError: No results found for song: Old - Chronic",
            "LookupError: No results found for song: New - Fresh",
        ],
        0,
    )])
    .await;
    let id = h.add("mix", "Mix").await;
    let last_sync = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
    h.library
        .update_item(&id, |item| item.last_synced_at = Some(last_sync))
        .await
        .unwrap();

    let catalog = FakeCatalog::default().reply(
        &id,
        Reply::Snapshot(SourceSnapshot {
            name: "Mix".to_string(),
            tracks: vec![
                RemoteTrack {
                    artists: vec!["Old".into()],
                    title: "Chronic".into(),
                    added_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
                },
                RemoteTrack {
                    artists: vec!["New".into()],
                    title: "Fresh".into(),
                    added_at: Some(Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()),
                },
            ],
            remote_updated_at: None,
        }),
    );
    let coordinator = h.coordinator(Some(catalog), None);

    let outcome = coordinator.sync_one(&id, &NullSink).await.unwrap();

    assert!(!outcome.result.succeeded);
    assert!(!outcome.result.crashed);
    assert_eq!(outcome.failures.new_failures, vec!["New - Fresh"]);
    assert_eq!(outcome.failures.persistent_failures, vec!["Old - Chronic"]);
    assert_eq!(outcome.item.expected_track_count, 2);
    assert!(outcome.item.last_synced_at.unwrap() > last_sync);
}

#[tokio::test]
async fn test_failed_metadata_fetch_still_downloads() {
    let h = Harness::new(vec![downloads(&["A - One"])]).await;
    let id = h.add("gone", "Gone").await;
    let coordinator = h.coordinator(Some(FakeCatalog::default()), None);

    let outcome = coordinator.sync_one(&id, &NullSink).await.unwrap();
    assert!(outcome.result.succeeded);
    assert_eq!(outcome.result.new_tracks, vec!["A - One"]);
    assert_eq!(h.launcher.launches(), 1);
}

#[tokio::test]
async fn test_refresh_skips_missing_and_stops_on_extreme_limit() {
    let h = Harness::new(Vec::new()).await;
    let a = h.add("a", "A").await;
    let b = h.add("b", "B").await;
    let c = h.add("c", "C").await;
    let d = h.add("d", "D").await;
    let catalog = FakeCatalog::default()
        .reply(&a, snapshot("A renamed", &[("X", "One")]))
        .reply(&b, Reply::NotFound)
        .reply(&c, Reply::Extreme)
        .reply(&d, snapshot("D", &[("Y", "One"), ("Y", "Two")]));
    let coordinator = h.coordinator(Some(catalog), None);

    let summary = coordinator.refresh_metadata(&NullSink).await.unwrap();

    assert_eq!(summary.total, 4);
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.skipped, vec![b]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].name, "C");

    let refreshed = h.library.get(&a).await.unwrap().unwrap();
    assert_eq!(refreshed.display_name, "A renamed");
    assert_eq!(refreshed.expected_track_count, 1);
    let untouched = h.library.get(&d).await.unwrap().unwrap();
    assert_eq!(untouched.expected_track_count, 0);
    assert!(untouched.expected_variants.is_none());
}

#[tokio::test]
async fn test_refresh_needs_a_catalog() {
    let h = Harness::new(Vec::new()).await;
    let coordinator = h.coordinator(None, None);
    let err = coordinator.refresh_metadata(&NullSink).await.unwrap_err();
    assert!(matches!(err, SyncError::NoCatalog));
}

fn meta(id: &str, name: &str, total: u32) -> PlaylistMeta {
    PlaylistMeta {
        id: id.to_string(),
        name: name.to_string(),
        tracks: TrackTotal { total },
        external_urls: Default::default(),
    }
}

#[tokio::test]
async fn test_sync_selection_adds_missing_and_skips_synced() {
    let h = Harness::new(vec![downloads(&["T - Song"])]).await;

    // "One" is tracked and complete on disk
    let one = h.add("p1", "One").await;
    h.library
        .update_item(&one, |item| item.expected_track_count = 1)
        .await
        .unwrap();
    touch(&h.music().join("One"), "A - Done.mp3").await;

    let two = playlist_url("p2");
    let catalog = FakeCatalog {
        playlists: vec![meta("p1", "One", 1), meta("p2", "Two", 1), meta("p3", "Three", 9)],
        ..FakeCatalog::default()
    }
    .reply(&two, snapshot("Two", &[("T", "Song")]));
    let coordinator = h.coordinator(Some(catalog), Some("me"));
    let sink = RecordingSink::default();

    let selected = vec!["p1".to_string(), format!("{}?si=abc", two), "nope".to_string()];
    let summary = coordinator.sync_selection(&selected, &sink).await.unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.synced_items, 1);
    assert_eq!(summary.new_tracks, vec!["T - Song"]);
    assert_eq!(h.launcher.launches(), 1);
    assert_eq!(*sink.progress.lock().unwrap(), vec![(1, 1)]);

    let added = h.library.get(&two).await.unwrap().unwrap();
    assert_eq!(added.display_name, "Two");
    assert!(added.last_synced_at.is_some());

    let usage = h.library.usage().await.unwrap();
    assert_eq!(usage.get("p1"), Some(&1));
    assert_eq!(usage.get("p2"), Some(&1));
    assert_eq!(usage.get("p3"), None);

    let ordered: Vec<String> = coordinator
        .profile_playlists()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.meta.name)
        .collect();
    assert_eq!(ordered, vec!["One", "Two", "Three"]);
}

#[tokio::test]
async fn test_profile_playlists_need_a_user_id() {
    let h = Harness::new(Vec::new()).await;
    let coordinator = h.coordinator(Some(FakeCatalog::default()), None);
    assert!(matches!(
        coordinator.profile_playlists().await,
        Err(SyncError::Invalid(_))
    ));
}
