use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use spotsync::{cli, config, error, management::Direction};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download a source, or every library item
    Sync(SyncOptions),

    /// Show the library with each item's sync status
    Status(StatusOptions),

    /// Re-fetch names and track lists from Spotify
    Refresh,

    /// Add a playlist or album to the library
    Add(AddOptions),

    /// Remove a source from the library
    Remove(SourceArg),

    /// Manage library groups
    Group(GroupOptions),

    /// Move a source into a group, or to the top level
    Move(MoveOptions),

    /// Move a source up or down within its list
    Reorder(ReorderOptions),

    /// Link an existing folder to a source
    Import(ImportOptions),

    /// List or sync the configured user's playlists
    Profile(ProfileOptions),

    /// Show the download history
    History(HistoryOptions),

    /// Read and change settings
    Config(ConfigOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct SyncOptions {
    /// Playlist or album URL (or spotify: URI) already in the library
    source: Option<String>,

    /// Sync every library item, one after the other
    #[clap(long, conflicts_with = "source")]
    all: bool,

    /// Print the downloader's raw output
    #[clap(long, short)]
    verbose: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StatusOptions {
    /// List local files of SOURCE that match none of its tracks
    #[clap(long, value_name = "SOURCE")]
    extras: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct AddOptions {
    url: String,

    /// Display name; looked up on Spotify when omitted
    #[clap(long)]
    name: Option<String>,

    /// Group to add the source to
    #[clap(long)]
    group: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct SourceArg {
    url: String,
}

#[derive(Parser, Debug, Clone)]
pub struct GroupOptions {
    #[command(subcommand)]
    command: GroupSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GroupSubcommand {
    /// Create a group
    Add {
        name: String,
        /// Nest the new group inside this one
        #[clap(long)]
        parent: Option<String>,
    },
    /// Rename a group
    Rename { name: String, new_name: String },
    /// Remove a group, keeping its items
    Remove { name: String },
    /// Collapse or expand a group
    Toggle { name: String },
}

#[derive(Parser, Debug, Clone)]
pub struct MoveOptions {
    url: String,

    /// Target group; the top level when omitted
    #[clap(long)]
    group: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DirectionArg {
    Up,
    Down,
}

#[derive(Parser, Debug, Clone)]
pub struct ReorderOptions {
    url: String,
    direction: DirectionArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ImportOptions {
    folder: PathBuf,
    url: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ProfileOptions {
    /// Playlist ids or URLs to sync; lists the profile when omitted
    #[clap(long, num_args = 1..)]
    select: Vec<String>,

    /// Print the downloader's raw output
    #[clap(long, short)]
    verbose: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct HistoryOptions {
    /// Only entries for this source
    #[clap(long)]
    source: Option<String>,

    /// Delete the whole history
    #[clap(long, conflicts_with = "source")]
    clear: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigOptions {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Print one setting
    Get { key: String },
    /// Change one setting
    Set { key: String, value: String },
    /// Print every setting
    List,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Sync(opt) => cli::sync(opt.source, opt.all, opt.verbose).await,
        Command::Status(opt) => cli::status(opt.extras).await,
        Command::Refresh => cli::refresh().await,
        Command::Add(opt) => cli::add(opt.url, opt.name, opt.group).await,
        Command::Remove(opt) => cli::remove(opt.url).await,
        Command::Group(opt) => {
            let action = match opt.command {
                GroupSubcommand::Add { name, parent } => cli::GroupAction::Add { name, parent },
                GroupSubcommand::Rename { name, new_name } => {
                    cli::GroupAction::Rename { name, new_name }
                }
                GroupSubcommand::Remove { name } => cli::GroupAction::Remove { name },
                GroupSubcommand::Toggle { name } => cli::GroupAction::Toggle { name },
            };
            cli::group(action).await
        }
        Command::Move(opt) => cli::move_item(opt.url, opt.group).await,
        Command::Reorder(opt) => {
            let direction = match opt.direction {
                DirectionArg::Up => Direction::Up,
                DirectionArg::Down => Direction::Down,
            };
            cli::reorder(opt.url, direction).await
        }
        Command::Import(opt) => cli::import(opt.folder, opt.url).await,
        Command::Profile(opt) => cli::profile(opt.select, opt.verbose).await,
        Command::History(opt) => cli::history(opt.source, opt.clear).await,
        Command::Config(opt) => match opt.command {
            ConfigSubcommand::Get { key } => cli::config_get(key).await,
            ConfigSubcommand::Set { key, value } => cli::config_set(key, value).await,
            ConfigSubcommand::List => cli::config_list().await,
        },
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
