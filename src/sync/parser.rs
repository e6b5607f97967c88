//! Classification of the downloader's output, one line at a time.
//!
//! All recognized markers live in the tables below. The retry state machine
//! in the downloader only ever sees the resulting [`LineSignals`].

/// Opening delimiter of a finished track; the name runs to the next quote.
pub const TRACK_MARKER: &str = "Downloaded \"";

/// Case-sensitive markers of a per-track provider failure.
pub const PROVIDER_ERROR_MARKERS: [&str; 2] = ["AudioProviderError", "LookupError"];
/// Case-insensitive provider failure markers.
pub const PROVIDER_ERROR_MARKERS_CI: [&str; 1] = ["download error"];

/// Prefix preceding the failed track name in `LookupError` lines.
pub const FAILED_SONG_MARKER: &str = "song:";

/// Case-insensitive rate-limit markers. Only count together with
/// [`RATE_LIMIT_SERVICE`] so throttling by other hosts is ignored.
pub const RATE_LIMIT_MARKERS: [&str; 4] = [
    "429",
    "rate/request limit",
    "max retries reached",
    "responseerror",
];
pub const RATE_LIMIT_SERVICE: &str = "spotify";

/// Case-insensitive marker followed by the server-requested wait in seconds.
pub const RETRY_AFTER_MARKER: &str = "retry will occur after:";

/// Everything one output line says about the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSignals {
    pub downloaded: Option<String>,
    pub provider_error: bool,
    pub failed_track: Option<String>,
    pub rate_limited: bool,
    pub retry_after_secs: Option<u64>,
}

impl LineSignals {
    pub fn is_empty(&self) -> bool {
        *self == LineSignals::default()
    }
}

pub fn classify_line(line: &str) -> LineSignals {
    let lower = line.to_lowercase();

    let provider_error = PROVIDER_ERROR_MARKERS.iter().any(|m| line.contains(m))
        || PROVIDER_ERROR_MARKERS_CI.iter().any(|m| lower.contains(m));

    LineSignals {
        downloaded: downloaded_track(line),
        provider_error,
        failed_track: if provider_error {
            failed_track(line)
        } else {
            None
        },
        rate_limited: RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
            && lower.contains(RATE_LIMIT_SERVICE),
        retry_after_secs: retry_after(&lower),
    }
}

fn downloaded_track(line: &str) -> Option<String> {
    let start = line.find(TRACK_MARKER)? + TRACK_MARKER.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    let name = rest[..end].trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn failed_track(line: &str) -> Option<String> {
    if !line.contains("LookupError") {
        return None;
    }
    let start = line.find(FAILED_SONG_MARKER)? + FAILED_SONG_MARKER.len();
    let name = line[start..].trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn retry_after(lower: &str) -> Option<u64> {
    let start = lower.find(RETRY_AFTER_MARKER)? + RETRY_AFTER_MARKER.len();
    let digits: String = lower[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_downloaded_track_name() {
        let s = classify_line(r#"Downloaded "Daft Punk - One More Time": https://music.youtube.com/watch?v=x"#);
        assert_eq!(s.downloaded.as_deref(), Some("Daft Punk - One More Time"));
        assert!(!s.provider_error);
    }

    #[test]
    fn lookup_error_carries_failed_song() {
        let s = classify_line("LookupError: No results found for song: Artist - Title");
        assert!(s.provider_error);
        assert_eq!(s.failed_track.as_deref(), Some("Artist - Title"));
    }

    #[test]
    fn audio_provider_error_without_name() {
        let s = classify_line("AudioProviderError: YT-DLP download error - https://youtu.be/abc");
        assert!(s.provider_error);
        assert_eq!(s.failed_track, None);
    }

    #[test]
    fn rate_limit_requires_service_marker() {
        assert!(classify_line("HTTP Error for GET to https://api.spotify.com/v1/tracks returned 429").rate_limited);
        assert!(!classify_line("youtube returned 429 Too Many Requests").rate_limited);
        assert!(classify_line("spotipy: Max Retries reached").rate_limited);
    }

    #[test]
    fn parses_retry_after_seconds() {
        let s = classify_line("Your application has reached a rate/request limit. Retry will occur after: 700 s");
        assert_eq!(s.retry_after_secs, Some(700));
        assert!(classify_line("Processing query").is_empty());
    }
}
