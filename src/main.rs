//! fetchgate - verified library image fetching
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use fetchgate::cancel::CancelToken;
use fetchgate::cli::{Cli, Commands};
use fetchgate::config::ConfigManager;
use fetchgate::error::FetchResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> FetchResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = config_manager.load().await?;
    cli.apply_overrides(&mut config);

    init_logging(cli.verbose, &config.general.log_format);
    debug!("Using config file {}", config_manager.path().display());

    // Ctrl-C cancels whatever pull is in flight
    let (cancel_handle, cancel) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            cancel_handle.cancel();
        }
    });

    match cli.command {
        Commands::Pull(args) => fetchgate::cli::commands::pull(args, &config, cancel).await,
        Commands::Cache(args) => fetchgate::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            fetchgate::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `log_format = "json"` switches to JSON lines
fn init_logging(verbose: u8, log_format: &str) {
    let filter = match verbose {
        0 => EnvFilter::new("fetchgate=warn"),
        1 => EnvFilter::new("fetchgate=info"),
        _ => EnvFilter::new("fetchgate=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
