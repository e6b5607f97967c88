use std::collections::HashSet;

use crate::utils;

const FEAT_MARKERS: [&str; 2] = [" (feat. ", " feat. "];

/// Expands one track into every filename base the downloader might have
/// written for it, sanitized and lower-cased.
///
/// The downloader's naming is not stable across releases, so detection
/// accepts the primary artist alone, all artists joined by `, `, ` & `,
/// ` and ` or a space, and each of those with a `feat.` suffix removed.
pub fn expand(artists: &[String], title: &str) -> HashSet<String> {
    let mut bases = Vec::new();

    if let Some(primary) = artists.first() {
        bases.push(format!("{} - {}", primary, title));
    } else {
        bases.push(title.to_string());
    }

    if artists.len() > 1 {
        for sep in [", ", " & ", " and ", " "] {
            bases.push(format!("{} - {}", artists.join(sep), title));
        }
    }

    let mut variants = HashSet::new();
    for base in bases {
        let stripped = strip_feat(&base);
        for candidate in [Some(base), stripped].into_iter().flatten() {
            let sanitized = utils::sanitize_filename(&candidate).to_lowercase();
            if !sanitized.is_empty() {
                variants.insert(sanitized);
            }
        }
    }
    variants
}

fn strip_feat(value: &str) -> Option<String> {
    FEAT_MARKERS
        .iter()
        .find_map(|marker| value.find(marker))
        .map(|pos| value[..pos].to_string())
}

/// Sorted variant list, the shape stored in the library.
pub fn expand_sorted(artists: &[String], title: &str) -> Vec<String> {
    let mut variants: Vec<String> = expand(artists, title).into_iter().collect();
    variants.sort();
    variants
}
