use std::{fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

/// Generic `{items, next}` envelope returned by every paginated endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackTotal {
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: TrackTotal,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub tracks: TrackTotal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistTrackItem {
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub track: Option<Track>,
}

/// One track of a remote source, reduced to what sync detection needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTrack {
    pub artists: Vec<String>,
    pub title: String,
    pub added_at: Option<DateTime<Utc>>,
}

impl RemoteTrack {
    /// `"Artist 1, Artist 2 - Title"`, the downloader's default naming.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.artists.join(", "), self.title)
    }
}

/// Everything fetched from the catalog about one source in a single refresh.
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub name: String,
    pub tracks: Vec<RemoteTrack>,
    pub remote_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Playlist,
    Album,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Playlist => write!(f, "playlist"),
            SourceKind::Album => write!(f, "album"),
        }
    }
}

/// A playlist or album tracked for sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub source_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub expected_track_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_variants: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remote_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_in_progress: bool,
    #[serde(default)]
    pub sync_interrupted: bool,
}

impl LibraryItem {
    pub fn new(source_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            display_name: display_name.into(),
            local_path: None,
            expected_track_count: 0,
            expected_variants: None,
            last_synced_at: None,
            last_checked_at: None,
            remote_updated_at: None,
            sync_in_progress: false,
            sync_interrupted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryGroup {
    pub name: String,
    #[serde(default)]
    pub items: Vec<LibraryNode>,
    #[serde(default)]
    pub collapsed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LibraryNode {
    Source(LibraryItem),
    Group(LibraryGroup),
}

/// Outcome of one downloader run, across all of its attempts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadResult {
    pub succeeded: bool,
    pub new_tracks: Vec<String>,
    pub failed_tracks: Vec<String>,
    pub crashed: bool,
    pub error_message: Option<String>,
}

impl DownloadResult {
    /// A clean pass that found nothing to download.
    pub fn is_up_to_date(&self) -> bool {
        self.succeeded && !self.crashed && self.new_tracks.is_empty() && self.failed_tracks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
}

/// What a history entry records about tracks: the names, or only a total.
#[derive(Debug, Clone)]
pub enum TrackRecord {
    List(Vec<String>),
    Count(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    New,
    Synced { local: usize },
    Partial { matched: usize, total: usize },
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::New => write!(f, "New"),
            SyncStatus::Synced { .. } => write!(f, "Synced"),
            SyncStatus::Partial { matched, total } => write!(f, "Partial ({}/{})", matched, total),
        }
    }
}

/// Display classification combining disk status with the item's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemHealth {
    UpdatesAvailable,
    Interrupted,
    New,
    Synced,
    Partial { matched: usize, total: usize },
}

impl fmt::Display for ItemHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemHealth::UpdatesAvailable => write!(f, "New Songs Available"),
            ItemHealth::Interrupted => write!(f, "Interrupted"),
            ItemHealth::New => write!(f, "New"),
            ItemHealth::Synced => write!(f, "Synced"),
            ItemHealth::Partial { matched, total } => write!(f, "Partial ({}/{})", matched, total),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureReport {
    pub new_failures: Vec<String>,
    pub persistent_failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub name: String,
    pub message: String,
}

/// Aggregate outcome of a batch of reconciliations.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub synced_items: usize,
    pub new_tracks: Vec<String>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Tabled)]
pub struct LibraryTableRow {
    pub group: String,
    pub name: String,
    pub status: String,
    pub last_sync: String,
}

#[derive(Tabled)]
pub struct HistoryTableRow {
    pub date: String,
    pub name: String,
    pub tracks: usize,
    pub note: String,
}

#[derive(Tabled)]
pub struct ProfileTableRow {
    pub id: String,
    pub name: String,
    pub tracks: u32,
    pub used: u64,
}
