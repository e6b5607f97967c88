//! Spotify Library Sync Library
//!
//! This library keeps a local music collection synchronized with a set of
//! Spotify playlists and albums. Downloads are delegated to an external tool
//! (spotDL by default), whose streamed output is parsed to track progress,
//! while the Spotify Web API is used to learn what each source is expected
//! to contain.
//!
//! # Modules
//!
//! - `cli` - Command-line interface implementations
//! - `config` - Environment loading and typed application settings
//! - `management` - Persisted stores: config document, library tree, history log, token
//! - `spotify` - Spotify Web API client, rate-limit gateway and catalog queries
//! - `status` - Reporting seam between the engine and the console
//! - `sync` - The sync engine: downloader, output parser, variants, reconciler, coordinator
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use spotsync::{config, status::NullSink, sync::SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> spotsync::Res<()> {
//!     config::load_env().await?;
//!     let engine = SyncEngine::open(config::data_dir(), Arc::new(NullSink)).await?;
//!     let reports = engine.coordinator.check_statuses(&NullSink).await?;
//!     println!("{} items checked", reports.len());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod management;
pub mod spotify;
pub mod status;
pub mod sync;
pub mod types;
pub mod utils;

/// Boxed error result used at the command and engine boundaries, where
/// typed errors from the stores, the gateway and the sync layer meet.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Blue `[o]` line for neutral information.
///
/// ```
/// info!("Checking {} library items", count);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Green `[✓]` line for a finished step.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Red `[!]` line, then exit with status 1.
///
/// Command layer only. The sync engine reports failures through its
/// return values and never ends the process.
///
/// ```
/// error!("Cannot open library. Err: {}", e);
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Yellow `[!]` line for a recoverable problem, such as one failed item
/// inside a batch.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}

/// Dimmed, indented line of raw downloader output.
#[macro_export]
macro_rules! trace {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("    {}", std::format!($($arg)*).dimmed());
  })
}
