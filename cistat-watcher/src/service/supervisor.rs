//! Process supervisor
//!
//! Runs a source adapter's command without blocking the caller and hands its
//! stdout to a completion callback:
//! - At most one fetch is in flight per session; extra starts are dropped
//! - The callback runs exactly once, whatever the exit status
//! - The live-fetch marker is cleared before the callback runs, so the
//!   callback itself may start the next fetch

use async_trait::async_trait;
use chrono::Utc;
use cistat_core::dto::command::FetchCommand;
use std::process::Stdio;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::session::{FetchSession, SessionHandle};

/// Callback receiving the raw stdout of a finished fetch
pub type OnComplete = Box<dyn FnOnce(String) + Send + 'static>;

/// Receives the OS process id once the command has been spawned
pub type OnSpawn<'a> = &'a (dyn Fn(u32) + Send + Sync);

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,

    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Executes external commands
///
/// The seam between the supervisor and the operating system; tests swap in
/// a scripted implementation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and captures its output
    ///
    /// Implementations that start a real process report its id through
    /// `on_spawn` before waiting on it.
    async fn run(
        &self,
        command: &FetchCommand,
        on_spawn: OnSpawn<'_>,
    ) -> std::io::Result<CommandOutput>;
}

/// Runs commands as child processes via tokio
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        command: &FetchCommand,
        on_spawn: OnSpawn<'_>,
    ) -> std::io::Result<CommandOutput> {
        let child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(pid) = child.id() {
            on_spawn(pid);
        }

        let output = child.wait_with_output().await?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Spawns fetch commands, one at a time per session
#[derive(Clone)]
pub struct ProcessSupervisor {
    runner: Arc<dyn CommandRunner>,
}

impl ProcessSupervisor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Starts a fetch for the session unless one is already live
    ///
    /// Must be called from within a tokio runtime. Returns `false` without
    /// spawning anything if a fetch is live or the session is closed.
    ///
    /// # Arguments
    /// * `session` - The session the fetch belongs to
    /// * `command` - The command to run
    /// * `on_complete` - Receives stdout once the process exits
    pub fn start(
        &self,
        session: &SessionHandle,
        command: FetchCommand,
        on_complete: OnComplete,
    ) -> bool {
        let session_id = {
            let mut guard = session.lock();
            let fetch = FetchSession {
                branch: guard.branch().to_string(),
                command: command.clone(),
                pid: None,
                started_at: Utc::now(),
            };
            if !guard.begin_fetch(fetch) {
                debug!(
                    "Not starting fetch for session {}: already in flight or closed",
                    guard.id()
                );
                return false;
            }
            guard.id()
        };

        debug!("Starting fetch for session {}: {}", session_id, command);

        let runner = Arc::clone(&self.runner);
        let weak = Arc::downgrade(session);

        tokio::spawn(async move {
            let recorder = weak.clone();
            let on_spawn = move |pid: u32| {
                if let Some(session) = recorder.upgrade() {
                    session.lock().record_pid(pid);
                }
            };

            let stdout = match runner.run(&command, &on_spawn).await {
                Ok(output) => {
                    if !output.success() {
                        debug!(
                            "{} exited with {:?}: stderr='{}'",
                            command.program,
                            output.exit_code,
                            output.stderr.trim()
                        );
                    }
                    output.stdout
                }
                Err(e) => {
                    warn!("Failed to run {}: {}", command.program, e);
                    String::new()
                }
            };

            if let Some(session) = weak.upgrade() {
                session.lock().finish_fetch();
            }

            on_complete(stdout);
        });

        true
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(Arc::new(TokioCommandRunner))
    }
}
