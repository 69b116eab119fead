//! Aggregate query result rows.
//!
//! Field names follow the analytics API wire format (`_id` for the group key).

use serde::{Deserialize, Serialize};

/// Row cap for the top repositories query.
pub const TOP_REPOS_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub total_events: u64,
    pub total_users: u64,
    pub total_commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCount {
    #[serde(rename = "_id")]
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteCount {
    /// Minute of the hour, 0..=59.
    #[serde(rename = "_id")]
    pub minute: u32,
    pub count: u64,
}

/// Sort rows by count descending, ties by name, and cap at `limit`.
pub(crate) fn rank_repos(mut rows: Vec<RepoCount>, limit: usize) -> Vec<RepoCount> {
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    rows.truncate(limit);
    rows
}
