use std::sync::Arc;

use tabled::Table;

use super::console::{ConsoleSink, open_engine};
use crate::{error, info, success, types::HistoryTableRow, utils};

const RECENT_ENTRIES: usize = 50;

pub async fn history(source: Option<String>, clear: bool) {
    let sink = Arc::new(ConsoleSink::new(false));
    let engine = match open_engine(sink.clone()).await {
        Ok(engine) => engine,
        Err(e) => {
            sink.finish();
            error!("Cannot open history. Err: {}", e);
        }
    };
    sink.finish();

    if clear {
        match engine.history.clear().await {
            Ok(()) => success!("History cleared"),
            Err(e) => error!("Cannot clear history. Err: {}", e),
        }
        return;
    }

    let entries = match source {
        Some(source) => {
            engine
                .history
                .find_by_source(&utils::normalize_source_url(&source))
                .await
        }
        None => engine.history.entries().await,
    };
    if entries.is_empty() {
        info!("No history yet");
        return;
    }

    let rows: Vec<HistoryTableRow> = entries
        .into_iter()
        .rev()
        .take(RECENT_ENTRIES)
        .map(|e| {
            let note = match (e.interrupted, e.error) {
                (Some(true), Some(err)) => format!("Interrupted: {}", err),
                (Some(true), None) => "Interrupted".to_string(),
                (_, Some(err)) => err,
                _ => String::new(),
            };
            HistoryTableRow {
                date: utils::format_timestamp(Some(e.timestamp)),
                name: e.name.unwrap_or(e.source),
                tracks: e.count,
                note,
            }
        })
        .collect();
    println!("{}", Table::new(rows));
}
