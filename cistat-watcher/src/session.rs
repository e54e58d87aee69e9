//! Watch session
//!
//! Contains all state owned by one watched context:
//! - The branch being watched plus the static extra branches
//! - The per-branch build cache
//! - The marker for the single in-flight fetch
//! - An open flag used as the liveness check by completion callbacks

use chrono::{DateTime, Utc};
use cistat_core::domain::session::SessionId;
use cistat_core::dto::command::FetchCommand;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::service::BuildCache;

/// Shared handle to a session
///
/// Completion callbacks hold a `Weak` of this so a dropped session is
/// detected rather than kept alive by an outstanding fetch.
pub type SessionHandle = Arc<Mutex<Session>>;

/// The one live poll of a session
#[derive(Debug, Clone)]
pub struct FetchSession {
    /// Branch that was being watched when the fetch started
    pub branch: String,

    /// Command the supervisor is running
    pub command: FetchCommand,

    /// OS process id of the running command, once spawned
    ///
    /// Lets a host find and kill a hung fetch.
    pub pid: Option<u32>,

    pub started_at: DateTime<Utc>,
}

/// One watched context
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    branch: String,
    extra_branches: Vec<String>,
    cache: BuildCache,
    fetch: Option<FetchSession>,
    open: bool,
}

impl Session {
    /// Creates a new session with an empty cache
    ///
    /// # Arguments
    /// * `branch` - The branch to watch
    /// * `extra_branches` - Branches watched alongside it for the session's lifetime
    pub fn new(branch: impl Into<String>, extra_branches: Vec<String>) -> SessionHandle {
        Arc::new(Mutex::new(Self {
            id: SessionId::new(),
            branch: branch.into(),
            extra_branches,
            cache: BuildCache::new(),
            fetch: None,
            open: true,
        }))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn extra_branches(&self) -> &[String] {
        &self.extra_branches
    }

    /// Watched branch first, then extras, without duplicates
    pub fn watched_branches(&self) -> Vec<String> {
        cistat_source::watched_branches(&self.branch, &self.extra_branches)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Switches the watched branch; cached entries are kept
    pub fn watch(&mut self, branch: impl Into<String>) {
        self.branch = branch.into();
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut BuildCache {
        &mut self.cache
    }

    /// True while a FetchSession is live
    pub fn fetch_in_progress(&self) -> bool {
        self.fetch.is_some()
    }

    pub fn current_fetch(&self) -> Option<&FetchSession> {
        self.fetch.as_ref()
    }

    /// Records a new live fetch
    ///
    /// Returns `false`, leaving the existing marker untouched, if a fetch is
    /// already live or the session is closed.
    pub fn begin_fetch(&mut self, fetch: FetchSession) -> bool {
        if !self.open || self.fetch.is_some() {
            return false;
        }
        self.fetch = Some(fetch);
        true
    }

    /// Records the process id of the live fetch, if any
    pub fn record_pid(&mut self, pid: u32) {
        if let Some(fetch) = self.fetch.as_mut() {
            fetch.pid = Some(pid);
        }
    }

    /// Clears the live-fetch marker
    pub fn finish_fetch(&mut self) -> Option<FetchSession> {
        self.fetch.take()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Tears the session down
    ///
    /// Outstanding fetches still complete, but their results are discarded.
    pub fn close(&mut self) {
        self.open = false;
    }
}
