//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// fetchgate - verified, cache-aware library image fetching
///
/// Pulls container images from a library, keeps one hash-checked copy
/// in a local cache and verifies signatures before handing them out.
#[derive(Parser, Debug)]
#[command(name = "fetchgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "FETCHGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bypass the image cache
    #[arg(long, global = true, env = "FETCHGATE_DISABLE_CACHE")]
    pub disable_cache: bool,

    /// Image cache directory
    #[arg(long, global = true, env = "FETCHGATE_CACHEDIR")]
    pub cache_dir: Option<PathBuf>,

    /// Library API base URL
    #[arg(long, global = true, env = "FETCHGATE_LIBRARY")]
    pub library: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull an image from the library
    Pull(PullArgs),

    /// Manage the image cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the pull command
#[derive(Parser, Debug)]
pub struct PullArgs {
    /// Image reference, e.g. library://alpine:latest
    pub reference: String,

    /// Architecture to pull (defaults to library.default_arch)
    #[arg(long)]
    pub arch: Option<String>,

    /// Write the image to this path and verify its signatures
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Bypass the image cache for this pull
    #[arg(long)]
    pub no_cache: bool,

    /// Hash-check the image even when it bypasses the cache
    #[arg(long)]
    pub strict_hash: bool,

    /// Fail if the image is not signed by a trusted key
    #[arg(long)]
    pub require_signed: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cache directory
    Path,

    /// List cached images
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove all cached images
    Clean {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
