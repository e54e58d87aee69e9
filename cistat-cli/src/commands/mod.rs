//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod command;
mod status;
mod watch;

use anyhow::Result;
use clap::Subcommand;
use cistat_watcher::WatcherConfig;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch build status once and exit
    Status {
        /// Branch to report on
        #[arg(short, long)]
        branch: String,

        /// Print builds as JSON instead of colored text
        #[arg(long)]
        json: bool,
    },
    /// Keep polling until every watched build has finished
    Watch {
        /// Branch to watch
        #[arg(short, long)]
        branch: String,
    },
    /// Print the provider command without running it
    Command {
        /// Branch the command would query
        #[arg(short, long)]
        branch: String,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The validated watcher configuration
pub async fn handle_command(command: Commands, config: &WatcherConfig) -> Result<()> {
    match command {
        Commands::Status { branch, json } => status::handle_status(&branch, json, config).await,
        Commands::Watch { branch } => watch::handle_watch(&branch, config).await,
        Commands::Command { branch } => command::handle_command(&branch, config),
    }
}
