//! # CLI Module
//!
//! Command implementations for `spotsync`. Every command opens the
//! [`crate::sync::SyncEngine`] (which runs the crash-recovery sweep), calls
//! into the coordinator or the library manager, and renders the outcome with
//! the console macros, `indicatif` spinners and `tabled` tables.
//!
//! ```text
//! CLI Layer (commands, ConsoleSink)
//!     ↓
//! Sync Engine (coordinator, reconciler, downloader)
//!     ↓
//! Management Layer (config store, library tree, history)   Spotify Layer
//! ```
//!
//! ## Commands
//!
//! - [`sync`] - Download one source or the whole library
//! - [`status`] - Library table with per-item health, or extra files
//! - [`refresh`] - History discovery plus metadata refresh
//! - [`add`], [`remove`], [`group`], [`move_item`], [`reorder`], [`import`] - Library management
//! - [`profile`] - List or batch-sync the configured user's playlists
//! - [`history`] - Show or clear the download history
//! - [`config_get`], [`config_set`], [`config_list`] - Application settings
//!
//! Failures end the command through `error!`, which exits with status 1.
//! Per-item failures inside a batch are reported with `warning!` instead.
//!
//! ## Usage Patterns
//!
//! ```bash
//! spotsync config set output_path ~/Music
//! spotsync add https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M
//! spotsync sync --all
//! spotsync status
//! ```

mod console;
mod history;
mod library;
mod settings;
mod sync;

pub use console::{ConsoleSink, install_cancel_handler, open_engine, spinner};
pub use history::history;
pub use library::{GroupAction, add, group, import, move_item, refresh, remove, reorder, status};
pub use settings::get as config_get;
pub use settings::list as config_list;
pub use settings::set as config_set;
pub use sync::{profile, sync};
