//! Event document store
//!
//! Persisted events live in one collection keyed by event id. Writes are
//! unordered bulk inserts where each document succeeds, is skipped as a
//! duplicate, or fails on its own; one bad document never blocks the rest.
//!
//! Reads are the fixed aggregate queries behind the analytics API:
//! totals, distinct actors, commit sum, top repositories and per-minute
//! activity.

pub mod error;
pub mod memory;
pub mod query;
pub mod report;
pub mod sqlite;

use async_trait::async_trait;
use types::event::Event;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use query::{MinuteCount, Overview, RepoCount, TOP_REPOS_LIMIT};
pub use report::{InsertFailure, InsertOutcome, InsertReport};
pub use sqlite::SqliteStore;

/// Storage for persisted events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Unordered bulk insert with per-document classification.
    ///
    /// `Err` means the call as a whole failed (nothing can be assumed
    /// stored); per-document problems are reported in the [`InsertReport`].
    async fn insert_many(&self, events: &[Event]) -> Result<InsertReport, StoreError>;

    async fn count_events(&self) -> Result<u64, StoreError>;

    /// Number of distinct `actor.login` values.
    async fn distinct_actor_count(&self) -> Result<u64, StoreError>;

    /// Sum of `payload.size` over push events.
    async fn total_commits(&self) -> Result<u64, StoreError>;

    /// Repositories by event count, descending, at most `limit` rows.
    async fn top_repos(&self, limit: usize) -> Result<Vec<RepoCount>, StoreError>;

    /// Event count per minute-of-hour bucket, ascending by minute.
    async fn activity_by_minute(&self) -> Result<Vec<MinuteCount>, StoreError>;

    async fn overview(&self) -> Result<Overview, StoreError> {
        let (total_events, total_users, total_commits) = tokio::try_join!(
            self.count_events(),
            self.distinct_actor_count(),
            self.total_commits()
        )?;
        Ok(Overview {
            total_events,
            total_users,
            total_commits,
        })
    }
}
