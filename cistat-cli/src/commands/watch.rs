//! Watch command
//!
//! Keeps a session polling and prints every render callback. Exits once a
//! render round ends with no fetch in flight and every cached build of the
//! watched branches has finished, or on Ctrl-C.
//!
//! The poller stops on its own after a fetch that yields nothing (failed
//! command, garbage output). If unfinished builds are still cached at that
//! point, the command loop requests another refresh after a grace period.

use anyhow::{Context, Result};
use cistat_watcher::{BuildPoller, Session, SessionHandle, WatcherConfig};
use colored::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::render::{RenderEvent, TerminalRenderer};

/// Added to the poll delay before the loop refreshes a stalled session
const RETRY_GRACE: Duration = Duration::from_secs(5);

/// How a watch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Every watched build reached a terminal status
    Settled,

    /// Stopped by the user
    Interrupted,
}

/// Watch a branch until its builds settle
pub async fn handle_watch(branch: &str, config: &WatcherConfig) -> Result<()> {
    let (tx, events) = mpsc::unbounded_channel();
    let poller = BuildPoller::from_config(config, Arc::new(TerminalRenderer::with_events(tx)));
    let session = Session::new(branch, config.extra_branches.clone());

    info!(
        "Watching {} via {} (poll delay {:?})",
        branch,
        poller.source().name(),
        config.poll_delay
    );

    let outcome = follow(
        &poller,
        &session,
        events,
        config.poll_delay + RETRY_GRACE,
        tokio::signal::ctrl_c(),
    )
    .await?;

    match outcome {
        WatchOutcome::Settled => println!("{}", "All watched builds finished.".green()),
        WatchOutcome::Interrupted => println!("{}", "Stopped.".yellow()),
    }
    Ok(())
}

/// Drives a session until it settles or `shutdown` resolves
///
/// # Arguments
/// * `poller` - Poller whose renderer feeds `events`
/// * `session` - The session to follow; closed on return
/// * `events` - Render callbacks forwarded by the renderer
/// * `retry_after` - Wait before refreshing a session that stopped unsettled
/// * `shutdown` - Resolves when the user asks to stop
pub async fn follow<F>(
    poller: &BuildPoller,
    session: &SessionHandle,
    mut events: mpsc::UnboundedReceiver<RenderEvent>,
    retry_after: Duration,
    shutdown: F,
) -> Result<WatchOutcome>
where
    F: Future<Output = std::io::Result<()>>,
{
    let last_branch = session
        .lock()
        .watched_branches()
        .last()
        .cloned()
        .context("Session watches no branch")?;
    tokio::pin!(shutdown);

    let mut stalled = false;
    poller.refresh(session);

    let outcome = loop {
        tokio::select! {
            event = events.recv() => {
                let event = event.context("Renderer went away")?;
                stalled = false;
                if ends_round(&event, &last_branch) {
                    if is_settled(session) {
                        break WatchOutcome::Settled;
                    }
                    println!();
                    stalled = !session.lock().fetch_in_progress();
                }
            }
            _ = tokio::time::sleep(retry_after), if stalled => {
                debug!("Polling stopped with unfinished builds cached, refreshing");
                stalled = false;
                poller.refresh(session);
            }
            signal = &mut shutdown => {
                signal.context("Failed to listen for Ctrl-C")?;
                break WatchOutcome::Interrupted;
            }
        }
    };

    session.lock().close();
    Ok(outcome)
}

/// The poller renders watched branches in order; the last one ends a round
fn ends_round(event: &RenderEvent, last_branch: &str) -> bool {
    !event.fetch_in_progress && event.branch == last_branch
}

/// No fetch in flight and nothing cached is still running
fn is_settled(session: &SessionHandle) -> bool {
    let session = session.lock();
    !session.fetch_in_progress()
        && session
            .watched_branches()
            .iter()
            .flat_map(|branch| session.cache().get(branch))
            .all(|build| build.is_terminal())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use cistat_core::domain::build::Build;
    use cistat_core::domain::status::BuildStatus;
    use cistat_core::dto::command::FetchCommand;
    use cistat_source::{CloudBuildSource, SourceSettings};
    use cistat_watcher::Immediate;
    use cistat_watcher::service::{CommandOutput, CommandRunner, OnSpawn, ProcessSupervisor};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replays scripted results, one per run
    struct ScriptedRunner {
        results: Mutex<VecDeque<CommandOutput>>,
        calls: Mutex<usize>,
    }

    impl ScriptedRunner {
        fn new(results: Vec<CommandOutput>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            _command: &FetchCommand,
            _on_spawn: OnSpawn<'_>,
        ) -> std::io::Result<CommandOutput> {
            *self.calls.lock() += 1;
            Ok(self.results.lock().pop_front().unwrap_or_default())
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn build_json(status: &str) -> String {
        format!(
            r#"[{{"status": "{}", "startTime": "2023-01-01T00:00:00Z",
                 "substitutions": {{"BRANCH_NAME": "main"}}}}]"#,
            status
        )
    }

    fn poller_with(
        runner: Arc<ScriptedRunner>,
    ) -> (BuildPoller, mpsc::UnboundedReceiver<RenderEvent>) {
        let (tx, events) = mpsc::unbounded_channel();
        let poller = BuildPoller::new(
            Arc::new(CloudBuildSource::new(SourceSettings::default())),
            ProcessSupervisor::new(runner),
            Arc::new(TerminalRenderer::with_events(tx)),
            Arc::new(Immediate),
        );
        (poller, events)
    }

    fn event(branch: &str, fetch_in_progress: bool) -> RenderEvent {
        RenderEvent {
            branch: branch.to_string(),
            fetch_in_progress,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_does_not_stall_watch() {
        let runner = ScriptedRunner::new(vec![
            ok(&build_json("WORKING")),
            CommandOutput {
                stdout: String::new(),
                stderr: "ERROR: (gcloud) network unreachable".to_string(),
                exit_code: Some(1),
            },
            ok(&build_json("SUCCESS")),
        ]);
        let (poller, events) = poller_with(runner.clone());
        let session = Session::new("main", Vec::new());

        let outcome = tokio::time::timeout(
            Duration::from_secs(60),
            follow(
                &poller,
                &session,
                events,
                Duration::from_secs(5),
                std::future::pending(),
            ),
        )
        .await
        .expect("watch stalled")
        .unwrap();

        assert_eq!(outcome, WatchOutcome::Settled);
        assert_eq!(runner.calls(), 3);
        assert_eq!(session.lock().cache().get("main")[0].status, BuildStatus::Success);
        assert!(!session.lock().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_result_settles_after_one_fetch() {
        let runner = ScriptedRunner::new(vec![ok(&build_json("FAILURE"))]);
        let (poller, events) = poller_with(runner.clone());
        let session = Session::new("main", vec!["preview".to_string()]);

        let outcome = follow(
            &poller,
            &session,
            events,
            Duration::from_secs(5),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WatchOutcome::Settled);
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_watch() {
        let runner = ScriptedRunner::new(vec![ok(&build_json("WORKING")); 64]);
        let (poller, events) = poller_with(runner);
        let session = Session::new("main", Vec::new());

        let outcome = follow(
            &poller,
            &session,
            events,
            Duration::from_secs(5),
            std::future::ready(Ok(())),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WatchOutcome::Interrupted);
        assert!(!session.lock().is_open());
    }

    #[test]
    fn test_round_ends_on_last_branch_without_fetch() {
        assert!(ends_round(&event("master", false), "master"));
        assert!(!ends_round(&event("master", true), "master"));
        assert!(!ends_round(&event("feature-x", false), "master"));
    }

    #[test]
    fn test_settled_requires_terminal_cache() {
        let session = Session::new("main", vec!["preview".to_string()]);
        assert!(is_settled(&session));

        let now = Utc::now();
        session
            .lock()
            .cache_mut()
            .put("main", vec![Build::new("main", BuildStatus::InProgress, now, None)]);
        assert!(!is_settled(&session));

        session
            .lock()
            .cache_mut()
            .put("main", vec![Build::new("main", BuildStatus::Success, now, None)]);
        assert!(is_settled(&session));
    }
}
