use std::sync::Arc;

use tabled::Table;

use super::console::{ConsoleSink, install_cancel_handler, open_engine};
use crate::{
    error, info, success,
    sync::SyncOutcome,
    types::{BatchSummary, ProfileTableRow},
    warning,
};

pub async fn sync(source: Option<String>, all: bool, verbose: bool) {
    let sink = Arc::new(ConsoleSink::new(verbose));
    let engine = match open_engine(sink.clone()).await {
        Ok(engine) => engine,
        Err(e) => {
            sink.finish();
            error!("Cannot open library. Err: {}", e);
        }
    };
    install_cancel_handler(engine.downloader.clone());

    match (source, all) {
        (Some(source), false) => {
            let outcome = engine.coordinator.sync_one(&source, sink.as_ref()).await;
            sink.finish();
            match outcome {
                Ok(outcome) => report_outcome(&outcome),
                Err(e) => error!("Sync failed. Err: {}", e),
            }
        }
        (None, true) => {
            let summary = engine.coordinator.sync_all(sink.as_ref()).await;
            sink.finish();
            match summary {
                Ok(summary) => report_batch(&summary),
                Err(e) => error!("Sync failed. Err: {}", e),
            }
        }
        _ => {
            sink.finish();
            error!("Pass either a source URL or --all");
        }
    }
}

fn report_outcome(outcome: &SyncOutcome) {
    let result = &outcome.result;
    let name = &outcome.item.display_name;

    if result.crashed {
        warning!(
            "{} interrupted: {}",
            name,
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    } else if result.is_up_to_date() {
        success!("{} is up to date", name);
    } else if result.succeeded {
        success!("{}: {} new track(s)", name, result.new_tracks.len());
    } else {
        warning!(
            "{}: {}",
            name,
            result.error_message.as_deref().unwrap_or("sync failed")
        );
    }

    let failures = &outcome.failures;
    if !failures.new_failures.is_empty() {
        warning!("{} newly added track(s) failed:", failures.new_failures.len());
        for track in &failures.new_failures {
            println!("    {}", track);
        }
    }
    if !failures.persistent_failures.is_empty() {
        info!(
            "{} track(s) are still unavailable from earlier syncs",
            failures.persistent_failures.len()
        );
    }
}

fn report_batch(summary: &BatchSummary) {
    success!(
        "Synced {} of {} item(s), {} new track(s)",
        summary.synced_items,
        summary.total,
        summary.new_tracks.len()
    );
    for failure in &summary.failures {
        warning!("{}: {}", failure.name, failure.message);
    }
}

/// Lists the profile's playlists, or syncs the selected ones.
pub async fn profile(select: Vec<String>, verbose: bool) {
    let sink = Arc::new(ConsoleSink::new(verbose));
    let engine = match open_engine(sink.clone()).await {
        Ok(engine) => engine,
        Err(e) => {
            sink.finish();
            error!("Cannot open library. Err: {}", e);
        }
    };

    if select.is_empty() {
        sink.set_message("Fetching profile playlists...");
        let playlists = engine.coordinator.profile_playlists().await;
        sink.finish();
        match playlists {
            Ok(playlists) => {
                let rows: Vec<ProfileTableRow> = playlists
                    .into_iter()
                    .map(|p| ProfileTableRow {
                        id: p.meta.id,
                        name: p.meta.name,
                        tracks: p.meta.tracks.total,
                        used: p.usage,
                    })
                    .collect();
                println!("{}", Table::new(rows));
            }
            Err(e) => error!("Cannot list profile playlists. Err: {}", e),
        }
        return;
    }

    install_cancel_handler(engine.downloader.clone());
    let summary = engine
        .coordinator
        .sync_selection(&select, sink.as_ref())
        .await;
    sink.finish();
    match summary {
        Ok(summary) => report_batch(&summary),
        Err(e) => error!("Profile sync failed. Err: {}", e),
    }
}
