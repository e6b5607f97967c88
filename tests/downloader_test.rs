mod common;

use std::{path::PathBuf, sync::Arc};

use tempfile::TempDir;
use tokio::sync::Notify;

use common::*;
use spotsync::sync::{
    DownloadJob,
    downloader::{CANCELLED_MESSAGE, EXHAUSTED_MESSAGE, PROVIDER_ERRORS_MESSAGE},
};

fn job(dir: &TempDir) -> DownloadJob {
    DownloadJob {
        source: playlist_url("abc"),
        name: "Road Trip".to_string(),
        target_dir: dir.path().join("Road Trip"),
    }
}

#[tokio::test]
async fn test_single_downloaded_line_then_clean_exit() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(
        &[
            "Processing query: https://open.spotify.com/playlist/abc",
            r#"Downloaded "Daft Punk - One More Time": https://music.youtube.com/watch?v=x"#,
        ],
        0,
    )]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let sink = RecordingSink::default();

    let result = orchestrator(launcher.clone(), sleeper.clone(), history.clone())
        .run(&job(&dir), &sink)
        .await;

    assert!(result.succeeded);
    assert!(!result.crashed);
    assert_eq!(result.new_tracks, vec!["Daft Punk - One More Time".to_string()]);
    assert_eq!(launcher.launches(), 1);
    assert!(sleeper.secs().is_empty());
    assert_eq!(*sink.tracks.lock().unwrap(), result.new_tracks);

    let entries = history.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].count, 1);
    assert_eq!(entries[0].name.as_deref(), Some("Road Trip"));
}

#[tokio::test]
async fn test_command_runs_in_target_dir_with_skip_policy() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(&[], 0)]));
    let job = job(&dir);

    orchestrator(
        launcher.clone(),
        Arc::new(RecordingSleeper::default()),
        open_history(dir.path()).await,
    )
    .run(&job, &RecordingSink::default())
    .await;

    let commands = launcher.commands.lock().unwrap();
    assert_eq!(commands[0].program, "spotdl");
    assert_eq!(commands[0].cwd, job.target_dir);
    assert_eq!(commands[0].args[0], job.source);
    assert!(commands[0].args.windows(2).any(|w| w[0] == "--overwrite" && w[1] == "skip"));
}

#[tokio::test]
async fn test_duplicate_track_lines_are_collected_once() {
    let dir = TempDir::new().unwrap();
    let line = r#"Downloaded "A - B": https://music.youtube.com/watch?v=y"#;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(&[line, line], 0)]));

    let result = orchestrator(
        launcher,
        Arc::new(RecordingSleeper::default()),
        open_history(dir.path()).await,
    )
    .run(&job(&dir), &RecordingSink::default())
    .await;

    assert_eq!(result.new_tracks, vec!["A - B".to_string()]);
}

#[tokio::test]
async fn test_extreme_wait_aborts_without_sleeping() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(
        &["Your application has reached a rate/request limit. Retry will occur after: 700 s"],
        1,
    )]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let result = orchestrator(launcher.clone(), sleeper.clone(), history.clone())
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(result.crashed);
    assert!(!result.succeeded);
    assert!(result.error_message.unwrap().contains("700s"));
    assert_eq!(launcher.launches(), 1);
    assert!(sleeper.secs().is_empty());

    let entries = history.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].count, 0);
}

#[tokio::test]
async fn test_extreme_wait_keeps_tracks_already_collected() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(
        &[
            r#"Downloaded "A - First": https://music.youtube.com/watch?v=1"#,
            "Retry will occur after: 3600",
            r#"Downloaded "A - Never Seen": https://music.youtube.com/watch?v=2"#,
        ],
        0,
    )]));

    let result = orchestrator(launcher, Arc::new(RecordingSleeper::default()), history.clone())
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(result.crashed);
    assert_eq!(result.new_tracks, vec!["A - First".to_string()]);
    assert_eq!(history.entries().await[0].tracks, vec!["A - First".to_string()]);
}

#[tokio::test]
async fn test_moderate_retry_hint_does_not_abort() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(
        &[
            "Retry will occur after: 30",
            r#"Downloaded "A - B": https://music.youtube.com/watch?v=y"#,
        ],
        0,
    )]));

    let result = orchestrator(
        launcher,
        Arc::new(RecordingSleeper::default()),
        open_history(dir.path()).await,
    )
    .run(&job(&dir), &RecordingSink::default())
    .await;

    assert!(result.succeeded);
    assert!(!result.crashed);
}

#[tokio::test]
async fn test_exhausted_attempts_crash_and_are_recorded() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(Vec::new()));
    let sleeper = Arc::new(RecordingSleeper::default());

    let result = orchestrator(launcher.clone(), sleeper.clone(), history.clone())
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(result.crashed);
    assert_eq!(result.error_message.as_deref(), Some(EXHAUSTED_MESSAGE));
    assert_eq!(launcher.launches(), 6);
    assert_eq!(sleeper.secs(), vec![3, 3, 3, 3, 3]);

    let entries = history.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].count, 0);
    assert_eq!(entries[0].error.as_deref(), Some(EXHAUSTED_MESSAGE));
}

#[tokio::test]
async fn test_rate_limited_attempt_backs_off_by_attempt_number() {
    let dir = TempDir::new().unwrap();
    let rate_limited = "HTTP Error for GET to https://api.spotify.com/v1/tracks returned 429";
    let launcher = Arc::new(ScriptedLauncher::new(vec![
        run(&[rate_limited], 1),
        run(&[rate_limited], 1),
        run(&["something else broke"], 1),
        run(&[r#"Downloaded "A - B": https://music.youtube.com/watch?v=y"#], 0),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let result = orchestrator(launcher.clone(), sleeper.clone(), open_history(dir.path()).await)
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(result.succeeded);
    assert_eq!(launcher.launches(), 4);
    // rate limit detection is per attempt, not latched
    assert_eq!(sleeper.secs(), vec![60, 120, 3]);
}

#[tokio::test]
async fn test_partial_progress_wins_over_failing_exit_code() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(
        &[r#"Downloaded "A - B": https://music.youtube.com/watch?v=y"#],
        1,
    )]));

    let result = orchestrator(
        launcher.clone(),
        Arc::new(RecordingSleeper::default()),
        open_history(dir.path()).await,
    )
    .run(&job(&dir), &RecordingSink::default())
    .await;

    assert!(result.succeeded);
    assert!(!result.crashed);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test]
async fn test_provider_errors_without_tracks_fail_without_crash() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(
        &["LookupError: No results found for song: Obscure - Track"],
        0,
    )]));

    let result = orchestrator(launcher, Arc::new(RecordingSleeper::default()), history.clone())
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(!result.succeeded);
    assert!(!result.crashed);
    assert_eq!(result.failed_tracks, vec!["Obscure - Track".to_string()]);
    assert_eq!(result.error_message.as_deref(), Some(PROVIDER_ERRORS_MESSAGE));
    assert_eq!(history.entries().await.len(), 1);
}

#[tokio::test]
async fn test_up_to_date_run_is_distinct_from_failure() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(&["Skipping A - B (file already exists)"], 0)]));

    let result = orchestrator(launcher, Arc::new(RecordingSleeper::default()), history.clone())
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(result.is_up_to_date());
    assert!(history.entries().await.is_empty());
}

#[tokio::test]
async fn test_launch_error_is_retried_after_short_delay() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(ScriptedLauncher::new(vec![
        Script::LaunchError,
        run(&[r#"Downloaded "A - B": https://music.youtube.com/watch?v=y"#], 0),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());

    let result = orchestrator(launcher, sleeper.clone(), open_history(dir.path()).await)
        .run(&job(&dir), &RecordingSink::default())
        .await;

    assert!(result.succeeded);
    assert_eq!(sleeper.secs(), vec![5]);
}

#[tokio::test]
async fn test_terminate_kills_running_child() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let started = Arc::new(Notify::new());
    let launcher = Arc::new(HangingLauncher {
        lines: vec![r#"Downloaded "A - B": https://music.youtube.com/watch?v=y"#.to_string()],
        started: started.clone(),
    });
    let orchestrator = Arc::new(orchestrator(
        launcher,
        Arc::new(RecordingSleeper::default()),
        history.clone(),
    ));

    let job = DownloadJob {
        source: playlist_url("abc"),
        name: "Road Trip".to_string(),
        target_dir: PathBuf::from(dir.path()),
    };
    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(&job, &RecordingSink::default()).await })
    };

    started.notified().await;
    orchestrator.terminate();
    let result = running.await.unwrap();

    assert!(result.crashed);
    assert_eq!(result.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(result.new_tracks, vec!["A - B".to_string()]);
    assert_eq!(history.entries().await.len(), 1);
}

#[tokio::test]
async fn test_cancel_before_run_is_kept_until_reset() {
    let dir = TempDir::new().unwrap();
    let history = open_history(dir.path()).await;
    let launcher = Arc::new(ScriptedLauncher::new(vec![run(&[], 0)]));
    let orchestrator = orchestrator(
        launcher.clone(),
        Arc::new(RecordingSleeper::default()),
        history.clone(),
    );

    orchestrator.terminate();
    let result = orchestrator.run(&job(&dir), &RecordingSink::default()).await;
    assert!(result.crashed);
    assert_eq!(result.error_message.as_deref(), Some(CANCELLED_MESSAGE));
    assert_eq!(launcher.launches(), 0);

    orchestrator.reset_cancel();
    let result = orchestrator.run(&job(&dir), &RecordingSink::default()).await;
    assert!(result.succeeded);
    assert_eq!(launcher.launches(), 1);
}
