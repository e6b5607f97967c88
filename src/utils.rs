use std::{path::Path, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::types::SourceKind;

pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "flac", "m4a", "ogg"];

const RESERVED_FILENAME_CHARS: &str = "<>:\"/\\|?*";
const DIRNAME_KEEP_CHARS: &str = " ._-()[]&,!'#+";

/// Async sleep behind a seam so backoff delays can be observed in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Normalizes a Spotify URL or URI into the canonical source id.
///
/// Query strings, fragments and trailing slashes are stripped, and
/// `spotify:<kind>:<id>` URIs become `https://open.spotify.com/<kind>/<id>`.
pub fn normalize_source_url(url: &str) -> String {
    let trimmed = url.trim();
    let end = trimmed.find(['?', '&', '#']).unwrap_or(trimmed.len());
    let url = trimmed[..end].trim_end_matches('/');

    if let Some(rest) = url.strip_prefix("spotify:") {
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() >= 2 {
            return format!("https://open.spotify.com/{}/{}", parts[0], parts[1]);
        }
    }

    url.to_string()
}

pub fn source_kind(source_id: &str) -> Option<SourceKind> {
    if source_id.contains("/playlist/") {
        Some(SourceKind::Playlist)
    } else if source_id.contains("/album/") {
        Some(SourceKind::Album)
    } else {
        None
    }
}

/// Last path segment of a normalized source id.
pub fn source_spotify_id(source_id: &str) -> Option<&str> {
    source_id.rsplit('/').next().filter(|id| !id.is_empty())
}

fn normalize_quotes(value: &str) -> String {
    value
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
}

/// Folder name derived from a display name, matching what the downloader
/// is pointed at when no explicit path is configured.
pub fn safe_dirname(name: &str) -> String {
    let name = normalize_quotes(name);
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || DIRNAME_KEEP_CHARS.contains(*c))
        .collect();
    let kept = kept.trim();

    if kept.is_empty() {
        "Untitled".to_string()
    } else {
        kept.to_string()
    }
}

/// Filesystem sanitization applied to every filename candidate: collapse
/// whitespace, straighten quote glyphs, replace reserved characters.
pub fn sanitize_filename(filename: &str) -> String {
    let collapsed = filename.split_whitespace().collect::<Vec<&str>>().join(" ");
    let mut sanitized = normalize_quotes(&collapsed);
    for c in RESERVED_FILENAME_CHARS.chars() {
        sanitized = sanitized.replace(c, "_");
    }
    sanitized.trim().to_string()
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Lower-cased file name with its extension removed.
pub fn file_base_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_lowercase())
}

/// Parses the dates Spotify hands out: RFC 3339 for `added_at`, and
/// `YYYY-MM-DD` / `YYYY-MM` / `YYYY` for album release dates.
pub fn parse_remote_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let padded = match value.len() {
        4 => format!("{}-01-01", value),
        7 => format!("{}-01", value),
        _ => value.to_string(),
    };

    NaiveDate::parse_from_str(&padded, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

pub fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts
            .with_timezone(&chrono::Local)
            .format("%d/%m/%Y %H:%M:%S")
            .to_string(),
        None => "Never".to_string(),
    }
}
