//! Response aggregator
//!
//! Providers may return several runs for one branch when watch windows
//! overlap. Only the most recently started run per branch is kept.

use cistat_core::domain::build::Build;
use std::collections::BTreeMap;

/// Collapses builds to exactly one per branch, latest start time wins
///
/// On an exact start-time tie the build encountered last wins.
pub fn dedup_latest(builds: impl IntoIterator<Item = Build>) -> BTreeMap<String, Build> {
    let mut latest: BTreeMap<String, Build> = BTreeMap::new();

    for build in builds {
        match latest.get(&build.branch) {
            Some(current) if current.start_time > build.start_time => {}
            _ => {
                latest.insert(build.branch.clone(), build);
            }
        }
    }

    latest
}
