use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Fetch opening and ending themes for every series and movie in the library.
#[derive(Debug, Parser)]
#[command(name = "shudaika", version, about)]
pub struct Cli {
    /// Use this config file instead of the user config.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve, download and reconcile themes for all enabled entries.
    Sync(SyncArgs),
    /// Look up AniList/MAL ids for a title.
    Search {
        title: String,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show the scored theme candidates of a catalog entry.
    Themes {
        /// AnimeThemes slug, e.g. `sousou_no_frieren`.
        slug: String,
        /// Apply the movie policy instead of the series one.
        #[arg(long)]
        movie: bool,
        /// Apply the video policy instead of the audio one.
        #[arg(long)]
        video: bool,
    },
    /// Manage library folders.
    #[command(subcommand)]
    Library(LibraryCommand),
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Download even when the target file already exists.
    #[arg(long)]
    pub force: bool,
    /// Delete theme files that are no longer wanted.
    #[arg(long)]
    pub delete: bool,
    /// Maximum simultaneous downloads.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=32))]
    pub concurrency: Option<u16>,
}

#[derive(Debug, Subcommand)]
pub enum LibraryCommand {
    /// Add a series or movie folder.
    Add {
        path: PathBuf,
        /// Title to search for; defaults to the folder name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        movie: bool,
    },
    List,
    Remove { id: i64 },
    Enable { id: i64 },
    Disable { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print where the config file lives.
    Path,
    /// Print the effective configuration.
    Show,
}
