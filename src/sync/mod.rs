//! # Sync Engine
//!
//! Keeps each tracked playlist or album folder in line with its remote
//! source.
//!
//! ```text
//! SyncCoordinator      - single item, whole library, profile selection;
//!          ↓             status checks (10 workers), metadata refresh (5)
//! SyncReconciler       - New / Partial / Synced from disk, crash flags,
//!          ↓             timestamps, history outcome
//! DownloadOrchestrator - one child process per attempt, retries, aborts
//!          ↓
//! parser               - output line → LineSignals
//! ```
//!
//! [`SyncEngine::open`] wires all of it from the data directory and runs
//! the crash-recovery sweep once: any item still flagged as in progress
//! belongs to a run that never finished and is marked interrupted. Every
//! engine holds a shared lock on [`INSTANCE_LOCK_FILE`] for its lifetime;
//! the sweep only runs when no other engine holds it, since their
//! in-progress items are live.

pub mod coordinator;
pub mod downloader;
pub mod parser;
pub mod reconciler;
pub mod variants;

use std::{path::PathBuf, sync::Arc};

pub use coordinator::{
    ItemReport, ProfilePlaylist, RefreshSummary, SyncCoordinator, SyncOutcome,
};
pub use downloader::{
    ChildHandle, DownloadCommand, DownloadJob, DownloadOrchestrator, OrchestratorConfig,
    ProcessLauncher, TokioLauncher,
};
pub use reconciler::{SyncError, SyncReconciler};

use crate::{
    Res,
    config::Settings,
    management::{ConfigStore, FileLock, HistoryManager, LibraryManager, TokenManager},
    spotify::{Catalog, RemoteGateway, SpotifyCatalog, SpotifyClient},
    status::StatusSink,
};

pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history.json";
pub const TOKEN_FILE: &str = "token_cache.json";
pub const INSTANCE_LOCK_FILE: &str = ".spotsync.lock";

/// Every long-lived component, opened from one data directory.
pub struct SyncEngine {
    pub store: Arc<ConfigStore>,
    pub settings: Settings,
    pub library: Arc<LibraryManager>,
    pub history: Arc<HistoryManager>,
    pub downloader: Arc<DownloadOrchestrator>,
    pub coordinator: SyncCoordinator,
    /// Items reclassified as interrupted by the startup sweep.
    pub recovered: usize,
    _instance: FileLock,
}

impl SyncEngine {
    /// Opens the stores under `data_dir` and runs the startup sweep unless
    /// another engine is alive on the same directory.
    ///
    /// Without Spotify credentials the engine still works from cached
    /// metadata; operations that need the API fail with
    /// [`SyncError::NoCatalog`].
    pub async fn open(data_dir: impl Into<PathBuf>, sink: Arc<dyn StatusSink>) -> Res<Self> {
        let data_dir = data_dir.into();
        let store = Arc::new(ConfigStore::open(data_dir.join(CONFIG_FILE)).await?);
        let settings = Settings::load(&store).await?;
        let library = Arc::new(LibraryManager::new(store.clone()));
        let history = Arc::new(HistoryManager::open(data_dir.join(HISTORY_FILE)).await?);

        let instance_path = data_dir.join(INSTANCE_LOCK_FILE);
        let (instance, recovered) = match FileLock::try_exclusive(&instance_path).await? {
            Some(sole) => {
                let recovered = library.recover_interrupted().await?;
                (sole.downgrade().await?, recovered)
            }
            None => (FileLock::shared(&instance_path).await?, 0),
        };

        let catalog: Option<Arc<dyn Catalog>> =
            match TokenManager::load(data_dir.join(TOKEN_FILE)).await {
                Ok(tokens) => {
                    let gateway = RemoteGateway::new(settings.api_retries, settings.extreme_rate_limit_secs)
                        .with_sink(sink.clone());
                    Some(Arc::new(SpotifyCatalog::new(
                        SpotifyClient::new(tokens),
                        Arc::new(gateway),
                    )))
                }
                Err(_) => None,
            };

        let downloader = Arc::new(DownloadOrchestrator::new(
            OrchestratorConfig::from(&settings),
            history.clone(),
        ));
        let reconciler = Arc::new(SyncReconciler::new(
            library.clone(),
            history.clone(),
            downloader.clone(),
            settings.output_path.clone(),
        ));
        let coordinator = SyncCoordinator::new(
            library.clone(),
            history.clone(),
            reconciler,
            downloader.clone(),
            catalog,
            settings.user_id.clone(),
        );

        Ok(Self {
            store,
            settings,
            library,
            history,
            downloader,
            coordinator,
            recovered,
            _instance: instance,
        })
    }
}
