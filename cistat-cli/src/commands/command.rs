//! Command preview
//!
//! Shows what would be executed for a branch, useful when a provider
//! returns nothing and the filter needs checking by hand.

use anyhow::Result;
use cistat_core::dto::command::FetchCommand;
use cistat_watcher::WatcherConfig;

/// Print the provider command for a branch
pub fn handle_command(branch: &str, config: &WatcherConfig) -> Result<()> {
    println!("{}", preview(branch, config));
    Ok(())
}

fn preview(branch: &str, config: &WatcherConfig) -> FetchCommand {
    config
        .provider
        .build(config.source_settings())
        .build_command(branch, &config.extra_branches)
}
