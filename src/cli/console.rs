use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    Res, config,
    status::{DEBUG_LOG_FILE, DebugLog, StatusSink},
    success,
    sync::{DownloadOrchestrator, SyncEngine},
    trace, warning,
};

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb
}

/// Renders engine events on the terminal: the current activity as a
/// spinner, finished tracks and batch progress as lines above it, and raw
/// downloader output when verbose. Raw output always lands in the debug log
/// under the data directory.
pub struct ConsoleSink {
    pb: ProgressBar,
    verbose: bool,
    debug_log: Option<DebugLog>,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        let pb = spinner("Starting...");
        let debug_log = match DebugLog::open(config::data_dir().join(DEBUG_LOG_FILE)) {
            Ok(log) => Some(log),
            Err(e) => {
                pb.suspend(|| warning!("Debug log unavailable: {}", e));
                None
            }
        };
        Self {
            pb,
            verbose,
            debug_log,
        }
    }

    pub fn set_message(&self, message: &str) {
        self.pb.set_message(message.to_string());
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl StatusSink for ConsoleSink {
    fn set_status(&self, text: Option<&str>) {
        match text {
            Some(text) => self.pb.set_message(text.to_string()),
            None => self.pb.set_message(""),
        }
    }

    fn log(&self, line: &str) {
        if let Some(debug_log) = &self.debug_log {
            debug_log.append(line);
        }
        if self.verbose {
            self.pb.suspend(|| trace!("{}", line));
        }
    }

    fn track_downloaded(&self, name: &str) {
        self.pb.suspend(|| success!("Downloaded {}", name));
    }

    fn progress(&self, current: usize, total: usize, label: &str) {
        self.pb.set_message(format!("[{}/{}] {}", current, total, label));
    }
}

/// Opens the engine from the data directory, reporting items the startup
/// sweep found interrupted.
pub async fn open_engine(sink: Arc<dyn StatusSink>) -> Res<SyncEngine> {
    let engine = SyncEngine::open(config::data_dir(), sink).await?;
    if engine.recovered > 0 {
        warning!(
            "{} library item(s) were interrupted by an earlier crash",
            engine.recovered
        );
    }
    Ok(engine)
}

/// First Ctrl-C kills the running download, a second one exits.
pub fn install_cancel_handler(downloader: Arc<DownloadOrchestrator>) {
    let count = Arc::new(AtomicU32::new(0));
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                warning!("Cancelling sync, press Ctrl-C again to force exit");
                downloader.terminate();
            } else {
                std::process::exit(130);
            }
        }
    });
}
