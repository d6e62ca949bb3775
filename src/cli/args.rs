//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    check::CheckArgs, completions::CompletionsArgs, graph::GraphArgs, load::LoadArgs,
    reset::ResetArgs, status::StatusArgs, watch::WatchArgs,
};

#[derive(Parser)]
#[command(name = "linkcache")]
#[command(author, version, about = "Local link-graph cache kept in sync with a remote wiki")]
#[command(
    long_about = "Caches the pages and outbound links of remote collections in a local SQLite \
                  store, refreshes them incrementally, and shares changes between processes."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Store location (default: from config, then the user data directory)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Extra config file, applied over the global one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh stale collections from the remote
    Check(CheckArgs),

    /// Print the cached pages of collections (never touches the network)
    Load(LoadArgs),

    /// Show the sync status of every known collection
    Status(StatusArgs),

    /// Make invalid collections eligible for checking again
    Reset(ResetArgs),

    /// Print the link graph of collections, including missing pages
    Graph(GraphArgs),

    /// Print changes made by other processes as they happen
    Watch(WatchArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output on a terminal, TSV when piped
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// Markdown tables
    Md,
}
