use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::{Mutex, mpsc, oneshot},
};

use super::parser::{self, LineSignals};
use crate::{
    config::{self, Settings},
    management::HistoryManager,
    status::StatusSink,
    types::{DownloadResult, TrackRecord},
    utils::{Sleeper, TokioSleeper},
};

/// Naming template handed to the downloader; sync detection depends on it.
pub const OUTPUT_TEMPLATE: &str = "{artists} - {title}.{output-ext}";

const LAUNCH_RETRY_SECS: u64 = 5;
const EXIT_RETRY_SECS: u64 = 3;
const RATE_LIMIT_BACKOFF_STEP_SECS: u64 = 60;
const RATE_LIMIT_BACKOFF_CAP_SECS: u64 = 300;

pub const CANCELLED_MESSAGE: &str = "Sync cancelled.";
pub const EXHAUSTED_MESSAGE: &str = "All retry attempts failed.";
pub const PROVIDER_ERRORS_MESSAGE: &str =
    "Provider errors occurred (LookupError/AudioProviderError)";

/// A fully resolved child process invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// A running child: its merged output, its exit code, and a way to kill it.
///
/// `lines` closes once both output streams are exhausted. `exit` resolves
/// only after the process has been reaped, also when it was killed.
pub struct ChildHandle {
    pub lines: mpsc::UnboundedReceiver<String>,
    pub exit: oneshot::Receiver<i32>,
    pub kill: Option<oneshot::Sender<()>>,
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, command: &DownloadCommand) -> io::Result<ChildHandle>;
}

/// Spawns real processes with `tokio::process`.
pub struct TokioLauncher;

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(&self, command: &DownloadCommand) -> io::Result<ChildHandle> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, line_tx);
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
            let _ = exit_tx.send(code);
        });

        Ok(ChildHandle {
            lines: line_rx,
            exit: exit_rx,
            kill: Some(kill_tx),
        })
    }
}

/// One source to download into one folder.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub source: String,
    pub name: String,
    pub target_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub program: String,
    pub cookie_file: Option<PathBuf>,
    pub max_attempts: u32,
    pub extreme_limit_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            program: config::DEFAULT_DOWNLOADER.to_string(),
            cookie_file: None,
            max_attempts: config::DEFAULT_DOWNLOAD_ATTEMPTS,
            extreme_limit_secs: config::DEFAULT_EXTREME_RATE_LIMIT_SECS,
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            program: settings.downloader_path.clone(),
            cookie_file: settings.cookie_file.clone(),
            max_attempts: settings.download_attempts.max(1),
            extreme_limit_secs: settings.extreme_rate_limit_secs,
        }
    }
}

impl OrchestratorConfig {
    pub fn command_for(&self, source: &str, target_dir: &Path) -> DownloadCommand {
        let mut args = vec![
            source.to_string(),
            "--output".to_string(),
            OUTPUT_TEMPLATE.to_string(),
            "--overwrite".to_string(),
            "skip".to_string(),
        ];
        if let Some(cookie) = self.cookie_file.as_ref().filter(|p| p.is_file()) {
            args.push("--cookie-file".to_string());
            args.push(cookie.to_string_lossy().into_owned());
        }

        DownloadCommand {
            program: self.program.clone(),
            args,
            cwd: target_dir.to_path_buf(),
        }
    }
}

/// What one child process did before it exited.
#[derive(Debug, Default)]
struct AttemptOutcome {
    exit_code: i32,
    provider_errors: bool,
    rate_limited: bool,
    extreme_wait: Option<u64>,
}

/// Runs the external downloader for one source at a time, with retries.
///
/// Only one run is active per orchestrator; concurrent callers queue on an
/// internal lock. [`DownloadOrchestrator::terminate`] may be called from
/// any task to kill the active child; the cancellation sticks, refusing
/// every later run, until [`DownloadOrchestrator::reset_cancel`].
pub struct DownloadOrchestrator {
    config: OrchestratorConfig,
    launcher: Arc<dyn ProcessLauncher>,
    sleeper: Arc<dyn Sleeper>,
    history: Arc<HistoryManager>,
    run_lock: Mutex<()>,
    active_kill: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    cancelled: AtomicBool,
}

impl DownloadOrchestrator {
    pub fn new(config: OrchestratorConfig, history: Arc<HistoryManager>) -> Self {
        Self {
            config,
            launcher: Arc::new(TokioLauncher),
            sleeper: Arc::new(TokioSleeper),
            history,
            run_lock: Mutex::new(()),
            active_kill: std::sync::Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Kills the active child, if any, and makes the current run return as
    /// cancelled instead of retrying.
    pub fn terminate(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.kill_active();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation. Called once per user-facing
    /// operation, never per run, so a cancel that lands between runs of a
    /// batch is not lost.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn set_active_kill(&self, kill: Option<oneshot::Sender<()>>) {
        if let Ok(mut slot) = self.active_kill.lock() {
            *slot = kill;
        }
    }

    fn kill_active(&self) {
        if let Ok(mut slot) = self.active_kill.lock() {
            if let Some(kill) = slot.take() {
                let _ = kill.send(());
            }
        }
    }

    pub async fn run(&self, job: &DownloadJob, sink: &dyn StatusSink) -> DownloadResult {
        let _guard = self.run_lock.lock().await;

        let command = self.config.command_for(&job.source, &job.target_dir);
        let max_attempts = self.config.max_attempts.max(1);
        let mut new_tracks: Vec<String> = Vec::new();
        let mut failed_tracks: Vec<String> = Vec::new();

        for attempt in 1..=max_attempts {
            if self.is_cancelled() {
                return self.cancelled_result(job, new_tracks, failed_tracks).await;
            }

            sink.set_status(Some(&format!(
                "Downloading {} (attempt {}/{})",
                job.name, attempt, max_attempts
            )));

            let handle = match self.launcher.launch(&command).await {
                Ok(handle) => handle,
                Err(e) => {
                    sink.log(&format!("Failed to start {}: {}", command.program, e));
                    if attempt < max_attempts {
                        self.sleeper
                            .sleep(Duration::from_secs(LAUNCH_RETRY_SECS))
                            .await;
                    }
                    continue;
                }
            };

            let outcome = self
                .drain(handle, sink, &mut new_tracks, &mut failed_tracks)
                .await;

            if let Some(wait) = outcome.extreme_wait {
                self.record(job, TrackRecord::List(new_tracks.clone()), None)
                    .await;
                sink.set_status(None);
                return DownloadResult {
                    succeeded: false,
                    new_tracks,
                    failed_tracks,
                    crashed: true,
                    error_message: Some(format!(
                        "Extreme subprocess rate limit ({}s). Aborted.",
                        wait
                    )),
                };
            }

            if self.is_cancelled() {
                return self.cancelled_result(job, new_tracks, failed_tracks).await;
            }

            if !new_tracks.is_empty() {
                self.record(job, TrackRecord::List(new_tracks.clone()), None)
                    .await;
                sink.set_status(None);
                return DownloadResult {
                    succeeded: true,
                    new_tracks,
                    failed_tracks,
                    crashed: false,
                    error_message: None,
                };
            }

            if outcome.exit_code == 0 {
                sink.set_status(None);
                if outcome.provider_errors {
                    self.record(
                        job,
                        TrackRecord::List(Vec::new()),
                        Some(PROVIDER_ERRORS_MESSAGE),
                    )
                    .await;
                    return DownloadResult {
                        succeeded: false,
                        new_tracks,
                        failed_tracks,
                        crashed: false,
                        error_message: Some(PROVIDER_ERRORS_MESSAGE.to_string()),
                    };
                }
                return DownloadResult {
                    succeeded: true,
                    ..DownloadResult::default()
                };
            }

            if attempt < max_attempts {
                let wait = backoff_secs(attempt, outcome.rate_limited);
                sink.set_status(Some(&format!(
                    "Downloader exited with code {}, retrying in {}s",
                    outcome.exit_code, wait
                )));
                self.sleeper.sleep(Duration::from_secs(wait)).await;
            }
        }

        self.record(job, TrackRecord::Count(0), Some(EXHAUSTED_MESSAGE))
            .await;
        sink.set_status(None);
        DownloadResult {
            succeeded: false,
            new_tracks,
            failed_tracks,
            crashed: true,
            error_message: Some(EXHAUSTED_MESSAGE.to_string()),
        }
    }

    async fn drain(
        &self,
        mut handle: ChildHandle,
        sink: &dyn StatusSink,
        new_tracks: &mut Vec<String>,
        failed_tracks: &mut Vec<String>,
    ) -> AttemptOutcome {
        self.set_active_kill(handle.kill.take());
        // terminate() may have fired between launch and registration
        if self.is_cancelled() {
            self.kill_active();
        }

        let mut outcome = AttemptOutcome::default();
        while let Some(line) = handle.lines.recv().await {
            sink.log(&line);
            let signals = parser::classify_line(&line);
            if self.absorb(signals, sink, &mut outcome, new_tracks, failed_tracks) {
                self.kill_active();
                break;
            }
        }

        outcome.exit_code = handle.exit.await.unwrap_or(-1);
        self.set_active_kill(None);
        outcome
    }

    /// Folds one line's signals into the attempt. Returns `true` when the
    /// child must be killed at once.
    fn absorb(
        &self,
        signals: LineSignals,
        sink: &dyn StatusSink,
        outcome: &mut AttemptOutcome,
        new_tracks: &mut Vec<String>,
        failed_tracks: &mut Vec<String>,
    ) -> bool {
        if let Some(track) = signals.downloaded {
            if !new_tracks.contains(&track) {
                sink.track_downloaded(&track);
                new_tracks.push(track);
            }
        }
        if signals.provider_error {
            outcome.provider_errors = true;
        }
        if let Some(track) = signals.failed_track {
            if !failed_tracks.contains(&track) {
                failed_tracks.push(track);
            }
        }
        if signals.rate_limited {
            outcome.rate_limited = true;
        }
        match signals.retry_after_secs {
            Some(wait) if wait > self.config.extreme_limit_secs => {
                outcome.extreme_wait = Some(wait);
                true
            }
            _ => false,
        }
    }

    async fn cancelled_result(
        &self,
        job: &DownloadJob,
        new_tracks: Vec<String>,
        failed_tracks: Vec<String>,
    ) -> DownloadResult {
        self.record(job, TrackRecord::List(new_tracks.clone()), None)
            .await;
        DownloadResult {
            succeeded: false,
            new_tracks,
            failed_tracks,
            crashed: true,
            error_message: Some(CANCELLED_MESSAGE.to_string()),
        }
    }

    /// History writes are best effort: a full disk must not turn a finished
    /// download into a failure.
    async fn record(&self, job: &DownloadJob, tracks: TrackRecord, error: Option<&str>) {
        let _ = self
            .history
            .add_entry(&job.source, tracks, Some(&job.name), error)
            .await;
    }
}

/// Seconds to wait after a failed attempt numbered from 1.
pub fn backoff_secs(attempt: u32, rate_limited: bool) -> u64 {
    if rate_limited {
        (RATE_LIMIT_BACKOFF_STEP_SECS * attempt as u64).min(RATE_LIMIT_BACKOFF_CAP_SECS)
    } else {
        EXIT_RETRY_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_backoff_is_capped() {
        assert_eq!(backoff_secs(1, true), 60);
        assert_eq!(backoff_secs(4, true), 240);
        assert_eq!(backoff_secs(6, true), 300);
        assert_eq!(backoff_secs(6, false), 3);
    }

    #[test]
    fn command_skips_missing_cookie_file() {
        let config = OrchestratorConfig {
            cookie_file: Some(PathBuf::from("/definitely/not/here/cookies.txt")),
            ..OrchestratorConfig::default()
        };
        let command = config.command_for("https://open.spotify.com/playlist/x", Path::new("/music"));
        assert_eq!(command.program, "spotdl");
        assert_eq!(command.cwd, PathBuf::from("/music"));
        assert!(!command.args.iter().any(|a| a == "--cookie-file"));
        assert_eq!(
            command.args,
            vec![
                "https://open.spotify.com/playlist/x",
                "--output",
                OUTPUT_TEMPLATE,
                "--overwrite",
                "skip"
            ]
        );
    }
}
