//! In-memory event store.
//!
//! Behaves like [`crate::SqliteStore`] (duplicate ids are skipped, each
//! document is classified on its own) and records the size of every
//! `insert_many` call.
//!
//! `fail_next_inserts`, `poison` and `clear_poison` are test hooks for
//! driving flush retry paths; no binary wires a `MemoryStore` in.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use types::event::Event;
use types::ids::EventId;

use crate::error::StoreError;
use crate::query::{rank_repos, MinuteCount, RepoCount};
use crate::report::{InsertFailure, InsertReport};
use crate::EventStore;

#[derive(Debug, Default)]
struct MemoryState {
    /// Stored events in insertion order.
    events: Vec<Event>,
    ids: HashSet<EventId>,
    /// Batch size of every insert_many call, including failed ones.
    insert_calls: Vec<usize>,
    /// Whole-call failures still to inject.
    fail_next: usize,
    /// Ids that fail individually with a non-duplicate error.
    poisoned: HashSet<EventId>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: make the next `n` `insert_many` calls fail as a whole
    /// with [`StoreError::Unavailable`].
    pub async fn fail_next_inserts(&self, n: usize) {
        self.state.lock().await.fail_next = n;
    }

    /// Test hook: make every insert of `id` fail with a non-duplicate error.
    pub async fn poison(&self, id: EventId) {
        self.state.lock().await.poisoned.insert(id);
    }

    pub async fn clear_poison(&self) {
        self.state.lock().await.poisoned.clear();
    }

    /// Sizes of all `insert_many` calls so far.
    pub async fn insert_calls(&self) -> Vec<usize> {
        self.state.lock().await.insert_calls.clone()
    }

    pub async fn stored_ids(&self) -> Vec<EventId> {
        self.state
            .lock()
            .await
            .events
            .iter()
            .map(|e| e.id.clone())
            .collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_many(&self, events: &[Event]) -> Result<InsertReport, StoreError> {
        let mut state = self.state.lock().await;
        state.insert_calls.push(events.len());

        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut report = InsertReport::new(events.len());
        for (index, event) in events.iter().enumerate() {
            if state.poisoned.contains(&event.id) {
                report.failures.push(InsertFailure {
                    index,
                    id: event.id.clone(),
                    reason: "injected document failure".to_string(),
                });
            } else if state.ids.contains(&event.id) {
                report.duplicates += 1;
            } else {
                state.ids.insert(event.id.clone());
                state.events.push(event.clone());
                report.inserted += 1;
            }
        }
        Ok(report)
    }

    async fn count_events(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.events.len() as u64)
    }

    async fn distinct_actor_count(&self) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        let actors: HashSet<&str> = state.events.iter().map(|e| e.actor.login.as_str()).collect();
        Ok(actors.len() as u64)
    }

    async fn total_commits(&self) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.is_push())
            .map(|e| e.commit_count())
            .sum())
    }

    async fn top_repos(&self, limit: usize) -> Result<Vec<RepoCount>, StoreError> {
        let state = self.state.lock().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for event in &state.events {
            *counts.entry(event.repo.name.as_str()).or_default() += 1;
        }
        let rows = counts
            .into_iter()
            .map(|(name, count)| RepoCount {
                name: name.to_string(),
                count,
            })
            .collect();
        Ok(rank_repos(rows, limit))
    }

    async fn activity_by_minute(&self) -> Result<Vec<MinuteCount>, StoreError> {
        let state = self.state.lock().await;
        let mut buckets: BTreeMap<u32, u64> = BTreeMap::new();
        for event in &state.events {
            *buckets.entry(event.minute_bucket()).or_default() += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|(minute, count)| MinuteCount { minute, count })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, repo: &str) -> Event {
        let line = format!(
            r#"{{"id":"{id}","type":"PushEvent","actor":{{"login":"u{id}"}},"repo":{{"name":"{repo}"}},"payload":{{"size":1}},"created_at":"2024-01-01T15:30:00Z"}}"#
        );
        Event::parse_line(&line).unwrap()
    }

    #[tokio::test]
    async fn test_injected_call_failure_stores_nothing() {
        let store = MemoryStore::new();
        store.fail_next_inserts(1).await;

        assert!(store.insert_many(&[event("1", "r/r")]).await.is_err());
        assert_eq!(store.count_events().await.unwrap(), 0);

        let report = store.insert_many(&[event("1", "r/r")]).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.insert_calls().await, vec![1, 1]);
    }

    #[tokio::test]
    async fn test_poisoned_document_fails_alone() {
        let store = MemoryStore::new();
        store.poison(EventId::new("2")).await;

        let report = store
            .insert_many(&[event("1", "r/r"), event("2", "r/r"), event("3", "r/r")])
            .await
            .unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_top_repos_capped() {
        let store = MemoryStore::new();
        let events: Vec<Event> = (0..15)
            .map(|i| event(&i.to_string(), &format!("repo/{:02}", i)))
            .collect();
        store.insert_many(&events).await.unwrap();
        store.insert_many(&[event("99", "repo/07")]).await.unwrap();

        let top = store.top_repos(10).await.unwrap();
        assert_eq!(top.len(), 10);
        assert_eq!(top[0], RepoCount { name: "repo/07".into(), count: 2 });
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
    }
}
