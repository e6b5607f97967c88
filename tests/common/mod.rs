#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc, oneshot};

use spotsync::{
    management::{ConfigStore, HistoryManager, LibraryManager},
    status::StatusSink,
    sync::{ChildHandle, DownloadCommand, DownloadOrchestrator, OrchestratorConfig, ProcessLauncher},
    utils::Sleeper,
};

/// Records requested sleeps and returns at once.
#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn secs(&self) -> Vec<u64> {
        self.sleeps.lock().unwrap().iter().map(|d| d.as_secs()).collect()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub statuses: Mutex<Vec<Option<String>>>,
    pub tracks: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<(usize, usize)>>,
}

impl StatusSink for RecordingSink {
    fn set_status(&self, text: Option<&str>) {
        self.statuses.lock().unwrap().push(text.map(str::to_string));
    }

    fn track_downloaded(&self, name: &str) {
        self.tracks.lock().unwrap().push(name.to_string());
    }

    fn progress(&self, current: usize, total: usize, _label: &str) {
        self.progress.lock().unwrap().push((current, total));
    }
}

/// What one scripted child prints before exiting with `exit`.
pub enum Script {
    Run { lines: Vec<String>, exit: i32 },
    LaunchError,
}

pub fn run(lines: &[&str], exit: i32) -> Script {
    Script::Run {
        lines: lines.iter().map(|l| l.to_string()).collect(),
        exit,
    }
}

/// Plays back one script per launch; launches past the end exit with 1.
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Script>>,
    pub commands: Mutex<Vec<DownloadCommand>>,
}

impl ScriptedLauncher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn launches(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, command: &DownloadCommand) -> io::Result<ChildHandle> {
        self.commands.lock().unwrap().push(command.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Run {
                lines: Vec::new(),
                exit: 1,
            });

        match script {
            Script::LaunchError => Err(io::Error::new(io::ErrorKind::NotFound, "spotdl not found")),
            Script::Run { lines, exit } => {
                let (line_tx, line_rx) = mpsc::unbounded_channel();
                for line in lines {
                    line_tx.send(line).unwrap();
                }
                drop(line_tx);

                let (exit_tx, exit_rx) = oneshot::channel();
                exit_tx.send(exit).unwrap();
                let (kill_tx, _kill_rx) = oneshot::channel();

                Ok(ChildHandle {
                    lines: line_rx,
                    exit: exit_rx,
                    kill: Some(kill_tx),
                })
            }
        }
    }
}

/// A child that prints `lines` and then runs until killed.
pub struct HangingLauncher {
    pub lines: Vec<String>,
    pub started: Arc<Notify>,
}

#[async_trait]
impl ProcessLauncher for HangingLauncher {
    async fn launch(&self, _command: &DownloadCommand) -> io::Result<ChildHandle> {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        for line in &self.lines {
            line_tx.send(line.clone()).unwrap();
        }
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let _ = kill_rx.await;
            drop(line_tx);
            let _ = exit_tx.send(-9);
        });
        self.started.notify_one();

        Ok(ChildHandle {
            lines: line_rx,
            exit: exit_rx,
            kill: Some(kill_tx),
        })
    }
}

pub async fn open_history(dir: &Path) -> Arc<HistoryManager> {
    Arc::new(HistoryManager::open(dir.join("history.json")).await.unwrap())
}

pub async fn open_library(dir: &Path) -> Arc<LibraryManager> {
    let store = ConfigStore::open(dir.join("config.json")).await.unwrap();
    Arc::new(LibraryManager::new(Arc::new(store)))
}

pub fn orchestrator(
    launcher: Arc<dyn ProcessLauncher>,
    sleeper: Arc<RecordingSleeper>,
    history: Arc<HistoryManager>,
) -> DownloadOrchestrator {
    DownloadOrchestrator::new(OrchestratorConfig::default(), history)
        .with_launcher(launcher)
        .with_sleeper(sleeper)
}

pub fn playlist_url(id: &str) -> String {
    format!("https://open.spotify.com/playlist/{}", id)
}
