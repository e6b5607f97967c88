use std::{path::PathBuf, sync::Arc};

use tabled::Table;

use super::console::{ConsoleSink, open_engine};
use crate::{
    error, info,
    management::Direction,
    success,
    sync::SyncEngine,
    types::LibraryTableRow,
    utils, warning,
};

async fn engine(sink: &Arc<ConsoleSink>) -> SyncEngine {
    match open_engine(sink.clone()).await {
        Ok(engine) => engine,
        Err(e) => {
            sink.finish();
            error!("Cannot open library. Err: {}", e);
        }
    }
}

/// Prints the library with each item's health, or the extra files of one
/// source when `extras` is given.
pub async fn status(extras: Option<String>) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;

    if let Some(source) = extras {
        let source = utils::normalize_source_url(&source);
        let item = match engine.library.get(&source).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                sink.finish();
                error!("{} is not in the library", source);
            }
            Err(e) => {
                sink.finish();
                error!("Cannot read library. Err: {}", e);
            }
        };
        let extras = engine.coordinator.reconciler().extras(&item).await;
        sink.finish();
        match extras {
            Ok(files) if files.is_empty() => success!("No extra files in {}", item.display_name),
            Ok(files) => {
                info!("{} file(s) match no track of {}:", files.len(), item.display_name);
                for file in files {
                    println!("    {}", file);
                }
            }
            Err(e) => error!("Cannot list folder. Err: {}", e),
        }
        return;
    }

    sink.set_message("Checking library folders...");
    let reports = engine.coordinator.check_statuses(sink.as_ref()).await;
    sink.finish();

    let reports = match reports {
        Ok(reports) => reports,
        Err(e) => error!("Cannot check library. Err: {}", e),
    };
    if reports.is_empty() {
        info!("The library is empty. Add a source with `spotsync add <URL>`.");
        return;
    }

    let rows: Vec<LibraryTableRow> = reports
        .into_iter()
        .map(|r| LibraryTableRow {
            group: r.group,
            name: r.item.display_name,
            status: match r.health {
                Ok(health) => health.to_string(),
                Err(e) => format!("Error: {}", e),
            },
            last_sync: utils::format_timestamp(r.item.last_synced_at),
        })
        .collect();
    println!("{}", Table::new(rows));
}

pub async fn refresh() {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;

    let discovered = engine.coordinator.discover().await;
    let summary = engine.coordinator.refresh_metadata(sink.as_ref()).await;
    sink.finish();

    match discovered {
        Ok(0) => {}
        Ok(n) => info!("Re-added {} playlist(s) found in the history", n),
        Err(e) => warning!("History discovery failed. Err: {}", e),
    }
    match summary {
        Ok(summary) => {
            success!(
                "Refreshed {} of {} library item(s)",
                summary.refreshed,
                summary.total
            );
            for skipped in &summary.skipped {
                warning!("Playlist skipped (404 Not Found): {}", skipped);
            }
            for failure in &summary.failures {
                warning!("{}: {}", failure.name, failure.message);
            }
        }
        Err(e) => error!("Cannot refresh metadata. Err: {}", e),
    }
}

pub async fn add(url: String, name: Option<String>, group: Option<String>) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;
    sink.set_message("Looking up source...");
    let added = engine
        .coordinator
        .add_source(&url, name.as_deref(), group.as_deref())
        .await;
    sink.finish();

    match added {
        Ok(item) => success!("Added {} to the library", item.display_name),
        Err(e) => error!("Cannot add {}. Err: {}", url, e),
    }
}

pub async fn remove(url: String) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;
    let removed = engine.coordinator.remove_source(&url).await;
    sink.finish();

    match removed {
        Ok(item) => success!("Removed {} from the library", item.display_name),
        Err(e) => error!("Cannot remove {}. Err: {}", url, e),
    }
}

pub enum GroupAction {
    Add { name: String, parent: Option<String> },
    Rename { name: String, new_name: String },
    Remove { name: String },
    Toggle { name: String },
}

pub async fn group(action: GroupAction) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;
    sink.finish();
    let library = &engine.library;

    match action {
        GroupAction::Add { name, parent } => match library.add_group(&name, parent.as_deref()).await {
            Ok(()) => success!("Created group {}", name),
            Err(e) => error!("Cannot create group. Err: {}", e),
        },
        GroupAction::Rename { name, new_name } => {
            match library.rename_group(&name, &new_name).await {
                Ok(()) => success!("Renamed group {} to {}", name, new_name),
                Err(e) => error!("Cannot rename group. Err: {}", e),
            }
        }
        GroupAction::Remove { name } => match library.remove_group(&name).await {
            Ok(()) => success!("Removed group {}, its items moved up", name),
            Err(e) => error!("Cannot remove group. Err: {}", e),
        },
        GroupAction::Toggle { name } => match library.toggle_group(&name).await {
            Ok(true) => success!("Collapsed group {}", name),
            Ok(false) => success!("Expanded group {}", name),
            Err(e) => error!("Cannot toggle group. Err: {}", e),
        },
    }
}

pub async fn move_item(url: String, group: Option<String>) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;
    sink.finish();

    let source = utils::normalize_source_url(&url);
    match engine.library.move_item(&source, group.as_deref()).await {
        Ok(()) => match group {
            Some(group) => success!("Moved {} to {}", source, group),
            None => success!("Moved {} to the top level", source),
        },
        Err(e) => error!("Cannot move {}. Err: {}", source, e),
    }
}

pub async fn reorder(url: String, direction: Direction) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;
    sink.finish();

    let source = utils::normalize_source_url(&url);
    match engine.library.reorder_item(&source, direction).await {
        Ok(true) => success!("Moved {} {:?}", source, direction),
        Ok(false) => info!("{} is already at the edge of its list", source),
        Err(e) => error!("Cannot reorder {}. Err: {}", source, e),
    }
}

pub async fn import(folder: PathBuf, url: String) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = engine(&sink).await;
    sink.set_message("Linking folder...");
    let imported = engine.coordinator.import_folder(&folder, &url).await;
    sink.finish();

    match imported {
        Ok(item) => success!(
            "Linked {} to {}",
            folder.display(),
            item.display_name
        ),
        Err(e) => error!("Cannot import {}. Err: {}", folder.display(), e),
    }
}
