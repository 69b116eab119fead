//! Batch consumer against the in-memory queue and store.

use std::sync::Arc;
use std::time::Duration;

use broker::{MemoryQueue, WorkQueue};
use common::RetryConfig;
use consumer::{BatchConsumer, ConsumerConfig, ConsumerError, ConsumerMetrics};
use store::{EventStore, MemoryStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use types::ids::EventId;

fn line(i: usize) -> String {
    format!(
        r#"{{"id":"{i}","type":"PushEvent","actor":{{"login":"dev{}"}},"repo":{{"name":"org/repo{}"}},"payload":{{"size":2}},"created_at":"2024-01-01T15:{:02}:00Z"}}"#,
        i % 50,
        i % 7,
        i % 60
    )
}

fn config(batch_size: usize) -> ConsumerConfig {
    ConsumerConfig {
        batch_size,
        pop_timeout: Duration::from_millis(50),
        flush_interval: None,
        flush_retry: RetryConfig::new(5, Duration::from_millis(100), Duration::from_secs(1), 2.0),
        pop_retry: RetryConfig::DEFAULT,
    }
}

struct Harness {
    queue: Arc<MemoryQueue>,
    store: Arc<MemoryStore>,
    metrics: Arc<ConsumerMetrics>,
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        Self {
            queue: Arc::new(MemoryQueue::unbounded()),
            store: Arc::new(MemoryStore::new()),
            metrics: Arc::new(ConsumerMetrics::new()),
            cancel: CancellationToken::new(),
        }
    }

    async fn push_lines(&self, range: std::ops::Range<usize>) {
        for i in range {
            self.queue.push(&line(i)).await.unwrap();
        }
    }

    fn spawn(&self, config: ConsumerConfig) -> JoinHandle<Result<(), ConsumerError>> {
        let mut consumer = BatchConsumer::new(
            self.queue.clone(),
            self.store.clone(),
            config,
            self.metrics.clone(),
        );
        let cancel = self.cancel.clone();
        tokio::spawn(async move { consumer.run(&cancel).await })
    }

    async fn wait_for_stored(&self, n: u64) {
        while self.store.count_events().await.unwrap() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_for_drained(&self) {
        while self.queue.len().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_batches_flush_exactly_at_batch_size() {
    let h = Harness::new();
    h.push_lines(0..1500).await;

    let task = h.spawn(config(500));
    h.wait_for_stored(1500).await;
    h.cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(h.store.insert_calls().await, vec![500, 500, 500]);
    assert_eq!(h.store.count_events().await.unwrap(), 1500);
    assert_eq!(h.queue.in_flight_len().await, 0);
    assert_eq!(h.metrics.export()["events_inserted"], 1500);
}

#[tokio::test(start_paused = true)]
async fn test_failed_batch_retried_unchanged() {
    let h = Harness::new();
    h.store.fail_next_inserts(2).await;
    h.push_lines(0..5).await;

    let task = h.spawn(config(3));
    h.wait_for_stored(3).await;

    // Items 3 and 4 were not popped while the first batch was held
    assert_eq!(h.store.insert_calls().await, vec![3, 3, 3]);
    let ids: Vec<String> = h.store.stored_ids().await.iter().map(|id| id.to_string()).collect();
    assert_eq!(ids, vec!["0", "1", "2"]);

    h.wait_for_drained().await;
    h.cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(h.store.insert_calls().await, vec![3, 3, 3, 2]);
    assert_eq!(h.metrics.export()["flush_failures"], 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_document_keeps_whole_batch() {
    let h = Harness::new();
    h.store.poison(EventId::new("1")).await;
    h.push_lines(0..3).await;

    let task = h.spawn(config(3));
    while h.metrics.export()["flush_failures"] < 1 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Still leased, nothing acked
    assert_eq!(h.queue.in_flight_len().await, 3);

    h.store.clear_poison().await;
    h.wait_for_stored(3).await;
    h.cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(h.queue.in_flight_len().await, 0);
    let calls = h.store.insert_calls().await;
    assert!(calls.iter().all(|n| *n == 3));
}

#[tokio::test(start_paused = true)]
async fn test_retry_budget_exhaustion_is_fatal() {
    let h = Harness::new();
    h.store.fail_next_inserts(usize::MAX).await;
    h.push_lines(0..2).await;

    let err = h.spawn(config(2)).await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ConsumerError::RetryBudgetExhausted { attempts: 6, .. }
    ));

    // Nothing acked: both items come back on recovery
    assert_eq!(h.queue.recover().await.unwrap(), 2);
    assert_eq!(h.store.count_events().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_events_stored_once() {
    let h = Harness::new();
    h.queue.push(&line(7)).await.unwrap();
    h.queue.push(&line(7)).await.unwrap();
    h.queue.push(&line(8)).await.unwrap();

    let task = h.spawn(config(3));
    h.wait_for_stored(2).await;
    h.cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(h.store.count_events().await.unwrap(), 2);
    assert_eq!(h.metrics.export()["duplicates_skipped"], 1);
    assert_eq!(h.queue.in_flight_len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_item_acked_and_counted() {
    let h = Harness::new();
    h.queue.push("{broken").await.unwrap();
    h.push_lines(0..1).await;

    let task = h.spawn(config(10));
    h.wait_for_drained().await;
    h.cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(h.metrics.export()["poison_items"], 1);
    assert_eq!(h.store.count_events().await.unwrap(), 1);
    assert_eq!(h.queue.in_flight_len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_partial_batch_once() {
    let h = Harness::new();
    h.push_lines(0..7).await;

    let task = h.spawn(config(500));
    h.wait_for_drained().await;
    while h.metrics.buffer_size() < 7 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.store.insert_calls().await.is_empty());

    h.cancel.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(h.store.insert_calls().await, vec![7]);
    assert_eq!(h.metrics.buffer_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_interval_flushes_partial_batch() {
    let h = Harness::new();
    h.push_lines(0..3).await;

    let task = h.spawn(ConsumerConfig {
        flush_interval: Some(Duration::from_secs(2)),
        ..config(500)
    });
    h.wait_for_stored(3).await;
    assert_eq!(h.store.insert_calls().await, vec![3]);

    h.cancel.cancel();
    task.await.unwrap().unwrap();
    // Empty final flush does not reach the store
    assert_eq!(h.store.insert_calls().await, vec![3]);
}
