//! Build cache
//!
//! Per-session mapping from branch to its latest known builds. Entries
//! persist across poll cycles and are replaced, never appended, when a fetch
//! brings news for that branch.

use cistat_core::domain::build::Build;
use std::collections::{BTreeMap, HashMap};

/// Latest known builds per branch
///
/// Holds no "loading" marker: whether an empty entry means "nothing fetched
/// yet" or "provider had nothing" is told apart by the session's in-flight flag.
#[derive(Debug, Clone, Default)]
pub struct BuildCache {
    entries: HashMap<String, Vec<Build>>,
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached builds for a branch, empty if none are known
    pub fn get(&self, branch: &str) -> &[Build] {
        self.entries.get(branch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the cached builds for a branch
    pub fn put(&mut self, branch: impl Into<String>, builds: Vec<Build>) {
        self.entries.insert(branch.into(), builds);
    }

    /// Stores each branch's aggregated build
    pub fn merge(&mut self, latest: BTreeMap<String, Build>) {
        for (branch, build) in latest {
            self.put(branch, vec![build]);
        }
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.entries.contains_key(branch)
    }

    /// Branches with a cache entry, sorted
    pub fn branches(&self) -> Vec<&str> {
        let mut branches: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        branches.sort_unstable();
        branches
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
