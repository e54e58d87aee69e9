//! Build poller
//!
//! Runs poll cycles for sessions. One cycle is:
//! spawn → parse → dedup → cache update → render → re-poll decision.
//! Everything after the spawn happens inside the supervisor's completion
//! callback, strictly in that order.

use cistat_core::domain::build::Build;
use cistat_source::SourceAdapter;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

use crate::config::WatcherConfig;
use crate::render::Renderer;
use crate::scheduler::delay::PollDelay;
use crate::service::{ProcessSupervisor, dedup_latest};
use crate::session::{Session, SessionHandle};

/// True if any aggregated build is still queued, running or unknown
pub fn needs_repoll(latest: &BTreeMap<String, Build>) -> bool {
    latest.values().any(|build| !build.is_terminal())
}

/// Polls a CI provider on behalf of sessions
///
/// Cheap to clone; every clone shares the same adapter, supervisor,
/// renderer and delay policy.
#[derive(Clone)]
pub struct BuildPoller {
    source: Arc<dyn SourceAdapter>,
    supervisor: ProcessSupervisor,
    renderer: Arc<dyn Renderer>,
    delay: Arc<dyn PollDelay>,
}

impl BuildPoller {
    /// Creates a new build poller
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        supervisor: ProcessSupervisor,
        renderer: Arc<dyn Renderer>,
        delay: Arc<dyn PollDelay>,
    ) -> Self {
        Self {
            source,
            supervisor,
            renderer,
            delay,
        }
    }

    /// Creates a poller for the configured provider using real processes
    pub fn from_config(config: &WatcherConfig, renderer: Arc<dyn Renderer>) -> Self {
        Self::new(
            Arc::from(config.provider.build(config.source_settings())),
            ProcessSupervisor::default(),
            renderer,
            config.poll_delay_policy(),
        )
    }

    pub fn source(&self) -> &dyn SourceAdapter {
        self.source.as_ref()
    }

    /// Requests a fetch for the session
    ///
    /// Renders the cached builds with the in-flight flag set, then starts a
    /// fetch unless one is already live. Must be called from within a tokio
    /// runtime.
    pub fn refresh(&self, session: &SessionHandle) {
        let (branch, extra_branches) = {
            let guard = session.lock();
            if !guard.is_open() {
                debug!("Ignoring refresh for closed session {}", guard.id());
                return;
            }
            (guard.branch().to_string(), guard.extra_branches().to_vec())
        };

        self.render(session, true);

        let command = self.source.build_command(&branch, &extra_branches);
        let poller = self.clone();
        let weak = Arc::downgrade(session);
        let fetched_branch = branch.clone();

        let started = self.supervisor.start(
            session,
            command,
            Box::new(move |raw: String| poller.on_fetch_complete(&weak, &fetched_branch, &raw)),
        );

        if !started {
            debug!("Fetch for {} already in flight, showing cached builds", branch);
        }
    }

    /// Switches the session to another branch and refreshes
    pub fn watch(&self, session: &SessionHandle, branch: impl Into<String>) {
        let branch = branch.into();
        info!("Now watching {}", branch);
        session.lock().watch(branch);
        self.refresh(session);
    }

    /// Completion callback for one fetch
    fn on_fetch_complete(&self, session: &Weak<Mutex<Session>>, fetched_branch: &str, raw: &str) {
        let Some(session) = session.upgrade() else {
            debug!("Session dropped before fetch for {} completed", fetched_branch);
            return;
        };

        let (session_id, current_branch) = {
            let guard = session.lock();
            if !guard.is_open() {
                debug!("Discarding fetch result for closed session {}", guard.id());
                return;
            }
            (guard.id(), guard.branch().to_string())
        };

        let builds = self.source.parse_response(raw);
        let parsed = builds.len();
        let latest = dedup_latest(builds);
        let repoll = needs_repoll(&latest);
        let delay = self.delay.next_delay(&latest);

        debug!(
            "Session {}: {} build(s) parsed, {} branch(es) after dedup",
            session_id,
            parsed,
            latest.len()
        );

        session.lock().cache_mut().merge(latest);
        self.render(&session, false);

        // The watched branch changed while this fetch was running
        let stale = current_branch != fetched_branch;

        if !repoll && !stale {
            debug!("All builds terminal for session {}, polling stops", session_id);
            return;
        }

        if delay.is_zero() {
            self.refresh(&session);
            return;
        }

        debug!("Re-polling session {} in {:?}", session_id, delay);
        let poller = self.clone();
        let weak = Arc::downgrade(&session);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(session) = weak.upgrade() {
                poller.refresh(&session);
            }
        });
    }

    /// Notifies the renderer for every watched branch
    fn render(&self, session: &SessionHandle, fetch_in_progress: bool) {
        let (session_id, snapshot) = {
            let guard = session.lock();
            if !guard.is_open() {
                return;
            }
            let snapshot: Vec<(String, Vec<Build>)> = guard
                .watched_branches()
                .into_iter()
                .map(|branch| {
                    let builds = guard.cache().get(&branch).to_vec();
                    (branch, builds)
                })
                .collect();
            (guard.id(), snapshot)
        };

        for (branch, builds) in snapshot {
            self.renderer
                .notify(session_id, &branch, &builds, fetch_in_progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::delay::{FixedDelay, Immediate};
    use crate::service::{CommandOutput, CommandRunner, OnSpawn};
    use async_trait::async_trait;
    use cistat_core::domain::session::SessionId;
    use cistat_core::domain::status::BuildStatus;
    use cistat_core::dto::command::FetchCommand;
    use cistat_source::{CloudBuildSource, SourceSettings};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};
    use tokio::time::timeout;

    /// Replays canned stdout, one entry per run, and records every command
    struct ScriptedRunner {
        outputs: Mutex<VecDeque<String>>,
        commands: Mutex<Vec<FetchCommand>>,

        /// When set, every run waits for a permit before returning
        gate: Option<Notify>,
    }

    impl ScriptedRunner {
        fn new(outputs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
                commands: Mutex::new(Vec::new()),
                gate: None,
            })
        }

        fn gated(outputs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
                commands: Mutex::new(Vec::new()),
                gate: Some(Notify::new()),
            })
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }

        fn calls(&self) -> usize {
            self.commands.lock().len()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(
            &self,
            command: &FetchCommand,
            _on_spawn: OnSpawn<'_>,
        ) -> std::io::Result<CommandOutput> {
            self.commands.lock().push(command.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let stdout = self.outputs.lock().pop_front().unwrap_or_default();
            Ok(CommandOutput {
                stdout,
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    #[derive(Debug)]
    struct Notification {
        branch: String,
        statuses: Vec<BuildStatus>,
        fetch_in_progress: bool,
    }

    struct RecordingRenderer {
        tx: mpsc::UnboundedSender<Notification>,
    }

    impl Renderer for RecordingRenderer {
        fn notify(&self, _session_id: SessionId, branch: &str, builds: &[Build], fetch_in_progress: bool) {
            let _ = self.tx.send(Notification {
                branch: branch.to_string(),
                statuses: builds.iter().map(|b| b.status).collect(),
                fetch_in_progress,
            });
        }
    }

    fn run(branch: &str, status: &str, start: &str) -> String {
        format!(
            r#"{{"status": "{}", "startTime": "{}", "substitutions": {{"BRANCH_NAME": "{}"}}}}"#,
            status, start, branch
        )
    }

    fn poller(
        runner: Arc<ScriptedRunner>,
        delay: Arc<dyn PollDelay>,
    ) -> (BuildPoller, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = BuildPoller::new(
            Arc::new(CloudBuildSource::new(SourceSettings::default())),
            ProcessSupervisor::new(runner),
            Arc::new(RecordingRenderer { tx }),
            delay,
        );
        (poller, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("renderer dropped")
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_terminal_result_stops_polling() {
        let output = format!("[{}]", run("main", "SUCCESS", "2023-01-01T00:00:00Z"));
        let runner = ScriptedRunner::new(&[&output]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);

        let before = next(&mut rx).await;
        assert!(before.fetch_in_progress);
        assert!(before.statuses.is_empty());

        let after = next(&mut rx).await;
        assert!(!after.fetch_in_progress);
        assert_eq!(after.statuses, vec![BuildStatus::Success]);

        settle().await;
        assert_eq!(runner.calls(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_terminal_result_triggers_exactly_one_more_fetch() {
        let working = format!("[{}]", run("main", "WORKING", "2023-01-01T00:00:00Z"));
        let done = format!("[{}]", run("main", "SUCCESS", "2023-01-01T00:00:00Z"));
        let runner = ScriptedRunner::new(&[&working, &done]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);

        assert!(next(&mut rx).await.fetch_in_progress);
        let first = next(&mut rx).await;
        assert_eq!(first.statuses, vec![BuildStatus::InProgress]);
        assert!(!first.fetch_in_progress);

        // Re-poll renders the cached in-progress build while fetching
        let repoll = next(&mut rx).await;
        assert!(repoll.fetch_in_progress);
        assert_eq!(repoll.statuses, vec![BuildStatus::InProgress]);

        let second = next(&mut rx).await;
        assert_eq!(second.statuses, vec![BuildStatus::Success]);

        settle().await;
        assert_eq!(runner.calls(), 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(session.lock().cache().get("main").len(), 1);
    }

    #[tokio::test]
    async fn test_dedup_before_caching() {
        let output = format!(
            "[{}, {}]",
            run("feature-x", "QUEUED", "2023-01-01T00:00:00Z"),
            run("feature-x", "SUCCESS", "2023-01-01T00:05:00Z")
        );
        let runner = ScriptedRunner::new(&[&output]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("feature-x", Vec::new());

        poller.refresh(&session);
        next(&mut rx).await;
        let after = next(&mut rx).await;

        assert_eq!(after.statuses, vec![BuildStatus::Success]);
        settle().await;
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_every_watched_branch_is_rendered() {
        let output = format!(
            "[{}, {}]",
            run("feature-x", "SUCCESS", "2023-01-01T00:00:00Z"),
            run("master", "FAILURE", "2023-01-01T00:00:00Z")
        );
        let runner = ScriptedRunner::new(&[&output]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let extras = vec!["preview".to_string(), "master".to_string()];
        let session = Session::new("feature-x", extras);

        poller.refresh(&session);
        for _ in 0..3 {
            assert!(next(&mut rx).await.fetch_in_progress);
        }

        let mut rendered = Vec::new();
        for _ in 0..3 {
            let n = next(&mut rx).await;
            rendered.push((n.branch, n.statuses));
        }
        assert_eq!(
            rendered,
            vec![
                ("feature-x".to_string(), vec![BuildStatus::Success]),
                ("preview".to_string(), vec![]),
                ("master".to_string(), vec![BuildStatus::Failed]),
            ]
        );

        let command = &runner.commands.lock()[0];
        let filter = command.args.last().unwrap();
        assert!(filter.contains(r#"BRANCH_NAME=("feature-x" "preview" "master")"#));
    }

    #[tokio::test]
    async fn test_garbage_output_leaves_cache_and_stops() {
        let runner = ScriptedRunner::new(&["ERROR: (gcloud) permission denied"]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());
        session.lock().cache_mut().put(
            "main",
            vec![Build::new("main", BuildStatus::Failed, chrono::Utc::now(), None)],
        );

        poller.refresh(&session);
        next(&mut rx).await;
        let after = next(&mut rx).await;

        assert_eq!(after.statuses, vec![BuildStatus::Failed]);
        settle().await;
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_while_live_only_renders() {
        let runner = ScriptedRunner::new(&["[]"]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);
        poller.refresh(&session);

        assert!(next(&mut rx).await.fetch_in_progress);
        assert!(next(&mut rx).await.fetch_in_progress);
        assert!(!next(&mut rx).await.fetch_in_progress);

        settle().await;
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_discards_result() {
        let output = format!("[{}]", run("main", "WORKING", "2023-01-01T00:00:00Z"));
        let runner = ScriptedRunner::new(&[&output]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);
        session.lock().close();
        next(&mut rx).await;

        settle().await;
        assert!(rx.try_recv().is_err());
        assert!(session.lock().cache().is_empty());
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_dropped_session_discards_result() {
        let output = format!("[{}]", run("main", "WORKING", "2023-01-01T00:00:00Z"));
        let runner = ScriptedRunner::gated(&[&output, &output]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);
        assert!(next(&mut rx).await.fetch_in_progress);
        tokio::task::yield_now().await;
        assert_eq!(runner.calls(), 1);

        drop(session);
        runner.release();
        runner.release();

        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_branch_switch_during_fetch_refetches() {
        let old = format!("[{}]", run("main", "SUCCESS", "2023-01-01T00:00:00Z"));
        let new = format!("[{}]", run("feature-y", "SUCCESS", "2023-01-01T00:00:00Z"));
        let runner = ScriptedRunner::new(&[&old, &new]);
        let (poller, mut rx) = poller(runner.clone(), Arc::new(Immediate));
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);
        // Fetch for main is live, so this only renders
        poller.watch(&session, "feature-y");

        let mut last = None;
        for _ in 0..5 {
            last = Some(next(&mut rx).await);
        }
        let last = last.unwrap();
        assert_eq!(last.branch, "feature-y");
        assert_eq!(last.statuses, vec![BuildStatus::Success]);

        settle().await;
        assert_eq!(runner.calls(), 2);
        let commands = runner.commands.lock();
        assert!(commands[1].args.last().unwrap().contains("feature-y"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_waits_before_repoll() {
        let working = format!("[{}]", run("main", "WORKING", "2023-01-01T00:00:00Z"));
        let done = format!("[{}]", run("main", "SUCCESS", "2023-01-01T00:00:00Z"));
        let runner = ScriptedRunner::new(&[&working, &done]);
        let (poller, mut rx) = poller(
            runner.clone(),
            Arc::new(FixedDelay(Duration::from_secs(30))),
        );
        let session = Session::new("main", Vec::new());

        poller.refresh(&session);
        next(&mut rx).await;
        assert_eq!(next(&mut rx).await.statuses, vec![BuildStatus::InProgress]);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(runner.calls(), 1);

        let repoll = next(&mut rx).await;
        assert!(repoll.fetch_in_progress);
        assert_eq!(next(&mut rx).await.statuses, vec![BuildStatus::Success]);
        assert_eq!(runner.calls(), 2);
    }

    #[test]
    fn test_needs_repoll() {
        let now = chrono::Utc::now();
        let mut latest = BTreeMap::new();
        assert!(!needs_repoll(&latest));

        latest.insert("a".to_string(), Build::new("a", BuildStatus::Success, now, None));
        latest.insert("b".to_string(), Build::new("b", BuildStatus::Failed, now, None));
        assert!(!needs_repoll(&latest));

        latest.insert("c".to_string(), Build::new("c", BuildStatus::Unknown, now, None));
        assert!(needs_repoll(&latest));
    }
}
