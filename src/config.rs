//! Configuration management for the Spotify library sync tool.
//!
//! Two layers are involved:
//! 1. Environment variables (optionally loaded from a `.env` file in the local
//!    data directory) carry Spotify credentials and API endpoints.
//! 2. The persisted [`ConfigStore`] document carries application settings and
//!    the library itself. [`Settings`] is the typed view over its keys.

use std::{env, path::PathBuf};

use crate::management::{ConfigStore, StoreError};

pub const DEFAULT_SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_DOWNLOADER: &str = "spotdl";

pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 6;
pub const DEFAULT_API_RETRIES: u32 = 3;
/// Server-requested waits above this many seconds abort instead of blocking.
pub const DEFAULT_EXTREME_RATE_LIMIT_SECS: u64 = 600;

pub const KEY_OUTPUT_PATH: &str = "output_path";
pub const KEY_DOWNLOADER_PATH: &str = "spotdl_path";
pub const KEY_COOKIE_FILE: &str = "cookie_file";
pub const KEY_USER_ID: &str = "spotify_user_id";
pub const KEY_DOWNLOAD_ATTEMPTS: &str = "download_attempts";
pub const KEY_API_RETRIES: &str = "api_retries";
pub const KEY_EXTREME_RATE_LIMIT: &str = "extreme_rate_limit_secs";
pub const KEY_LIBRARY: &str = "library";
pub const KEY_IGNORED: &str = "ignored_library_urls";
pub const KEY_USAGE: &str = "playlist_usage";

/// Keys a user may change with `spotsync config set`.
pub const SETTING_KEYS: [&str; 7] = [
    KEY_OUTPUT_PATH,
    KEY_DOWNLOADER_PATH,
    KEY_COOKIE_FILE,
    KEY_USER_ID,
    KEY_DOWNLOAD_ATTEMPTS,
    KEY_API_RETRIES,
    KEY_EXTREME_RATE_LIMIT,
];

/// Platform-specific data directory for this application.
///
/// - Linux: `~/.local/share/spotsync`
/// - macOS: `~/Library/Application Support/spotsync`
/// - Windows: `%LOCALAPPDATA%/spotsync`
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spotsync");
    path
}

/// Loads environment variables from a `.env` file in the local data directory.
///
/// A missing file is not an error: every variable can also come from the
/// process environment.
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

pub fn spotify_client_id() -> Option<String> {
    env::var("SPOTIFY_API_AUTH_CLIENT_ID").ok().filter(|v| !v.is_empty())
}

pub fn spotify_client_secret() -> Option<String> {
    env::var("SPOTIFY_API_AUTH_CLIENT_SECRET")
        .ok()
        .filter(|v| !v.is_empty())
}

pub fn spotify_apiurl() -> String {
    env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_SPOTIFY_API_URL.to_string())
}

pub fn spotify_apitoken_url() -> String {
    env::var("SPOTIFY_API_TOKEN_URL").unwrap_or_else(|_| DEFAULT_SPOTIFY_TOKEN_URL.to_string())
}

/// Environment fallback for the profile whose playlists `profile` lists.
pub fn spotify_user() -> Option<String> {
    env::var("SPOTIFY_USER_ID").ok().filter(|v| !v.is_empty())
}

/// Typed snapshot of the application settings held in the config store.
#[derive(Debug, Clone)]
pub struct Settings {
    pub output_path: PathBuf,
    pub downloader_path: String,
    pub cookie_file: Option<PathBuf>,
    pub user_id: Option<String>,
    pub download_attempts: u32,
    pub api_retries: u32,
    pub extreme_rate_limit_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_path: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            downloader_path: DEFAULT_DOWNLOADER.to_string(),
            cookie_file: None,
            user_id: None,
            download_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            api_retries: DEFAULT_API_RETRIES,
            extreme_rate_limit_secs: DEFAULT_EXTREME_RATE_LIMIT_SECS,
        }
    }
}

impl Settings {
    pub async fn load(store: &ConfigStore) -> Result<Self, StoreError> {
        let defaults = Settings::default();

        let output_path = store
            .get::<String>(KEY_OUTPUT_PATH)
            .await?
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.output_path);
        let downloader_path = store
            .get::<String>(KEY_DOWNLOADER_PATH)
            .await?
            .filter(|p| !p.is_empty())
            .unwrap_or(defaults.downloader_path);
        let cookie_file = store
            .get::<String>(KEY_COOKIE_FILE)
            .await?
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let user_id = store
            .get::<String>(KEY_USER_ID)
            .await?
            .filter(|u| !u.is_empty())
            .or_else(spotify_user);

        Ok(Self {
            output_path,
            downloader_path,
            cookie_file,
            user_id,
            download_attempts: store
                .get(KEY_DOWNLOAD_ATTEMPTS)
                .await?
                .unwrap_or(defaults.download_attempts)
                .max(1),
            api_retries: store
                .get(KEY_API_RETRIES)
                .await?
                .unwrap_or(defaults.api_retries),
            extreme_rate_limit_secs: store
                .get(KEY_EXTREME_RATE_LIMIT)
                .await?
                .unwrap_or(defaults.extreme_rate_limit_secs),
        })
    }
}

/// Parses a `config set` value into the JSON type the key is stored as.
pub fn parse_setting(key: &str, raw: &str) -> Result<serde_json::Value, String> {
    match key {
        KEY_DOWNLOAD_ATTEMPTS | KEY_API_RETRIES | KEY_EXTREME_RATE_LIMIT => raw
            .trim()
            .parse::<u64>()
            .map(serde_json::Value::from)
            .map_err(|_| format!("'{}' expects a whole number, got '{}'", key, raw)),
        k if SETTING_KEYS.contains(&k) => Ok(serde_json::Value::from(raw.to_string())),
        _ => Err(format!(
            "Unknown setting '{}'. Known settings: {}",
            key,
            SETTING_KEYS.join(", ")
        )),
    }
}
