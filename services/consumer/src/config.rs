use std::time::Duration;

use common::RetryConfig;

/// Configuration for the batch consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Flush as soon as the batch holds this many events.
    pub batch_size: usize,
    /// Longest single wait on the queue.
    pub pop_timeout: Duration,
    /// Flush a non-empty batch this long after the previous flush even when
    /// it is not full. `None` flushes on size and shutdown only.
    pub flush_interval: Option<Duration>,
    /// Backoff and budget for failed store writes.
    pub flush_retry: RetryConfig,
    /// Backoff and budget for failed queue pops.
    pub pop_retry: RetryConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            pop_timeout: Duration::from_secs(1),
            flush_interval: Some(Duration::from_secs(5)),
            flush_retry: RetryConfig::DEFAULT,
            pop_retry: RetryConfig::DEFAULT,
        }
    }
}
