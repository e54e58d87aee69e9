//! Status command
//!
//! Runs a single fetch for the watched branches, prints the result and
//! exits without re-polling.

use anyhow::{Context, Result};
use chrono::Utc;
use cistat_source::SourceAdapter;
use cistat_watcher::service::{ProcessSupervisor, dedup_latest};
use cistat_watcher::{BuildView, Renderer, Session, SessionHandle, WatcherConfig};
use std::collections::BTreeMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::render::TerminalRenderer;

/// Fetch and display build status once
pub async fn handle_status(branch: &str, json: bool, config: &WatcherConfig) -> Result<()> {
    let source = config.provider.build(config.source_settings());
    let session = Session::new(branch, config.extra_branches.clone());

    fetch_once(source.as_ref(), &ProcessSupervisor::default(), &session).await?;

    if json {
        let views = snapshot(&session);
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        let renderer = TerminalRenderer::new();
        let guard = session.lock();
        for branch in guard.watched_branches() {
            renderer.notify(guard.id(), &branch, guard.cache().get(&branch), false);
        }
    }

    Ok(())
}

/// Runs one fetch and stores its aggregated result in the session cache
async fn fetch_once(
    source: &dyn SourceAdapter,
    supervisor: &ProcessSupervisor,
    session: &SessionHandle,
) -> Result<()> {
    let command = {
        let guard = session.lock();
        source.build_command(guard.branch(), guard.extra_branches())
    };
    debug!("Running {}", command);

    let (tx, rx) = oneshot::channel();
    supervisor.start(
        session,
        command,
        Box::new(move |stdout: String| {
            let _ = tx.send(stdout);
        }),
    );

    let raw = rx.await.context("Fetch finished without reporting output")?;
    let latest = dedup_latest(source.parse_response(&raw));
    session.lock().cache_mut().merge(latest);
    Ok(())
}

/// Watched branches and their cached builds, ready for JSON output
fn snapshot(session: &SessionHandle) -> BTreeMap<String, Vec<BuildView>> {
    let now = Utc::now();
    let guard = session.lock();
    guard
        .watched_branches()
        .into_iter()
        .map(|branch| {
            let views = guard
                .cache()
                .get(&branch)
                .iter()
                .map(|build| BuildView::at(build, now))
                .collect();
            (branch, views)
        })
        .collect()
}
