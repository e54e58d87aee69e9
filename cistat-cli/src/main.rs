//! Cistat CLI
//!
//! Command-line host for the build watcher: reports or follows the CI
//! builds of a branch in the terminal.

mod commands;
mod config;
mod render;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::GlobalArgs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "cistat=info,cistat_watcher=info,cistat_source=info";

#[derive(Parser)]
#[command(name = "cistat")]
#[command(about = "CI build status for the branch you are on", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

// Completion callbacks share the command loop's thread, which `watch` relies on
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr so rendered output stays on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.global.watcher_config()?;

    handle_command(cli.command, &config).await
}
