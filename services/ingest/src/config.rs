use std::time::Duration;

use common::RetryConfig;

/// Default archive hour ingested when no URL is configured.
pub const DEFAULT_FEED_URL: &str = "http://data.githubarchive.org/2024-01-01-15.json.gz";

/// Configuration for the feed client and producer.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Gzip NDJSON feed location.
    pub feed_url: String,
    /// Connect and response-header timeout for the feed request.
    pub request_timeout: Duration,
    /// Log a progress line every this many queued events.
    pub progress_interval: u64,
    /// Backoff while the queue rejects pushes as full.
    pub full_queue_backoff: RetryConfig,
    /// Backoff and budget for transient push failures.
    pub push_retry: RetryConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            progress_interval: 1000,
            full_queue_backoff: RetryConfig::new(
                u32::MAX,
                Duration::from_millis(50),
                Duration::from_secs(2),
                2.0,
            ),
            push_retry: RetryConfig::DEFAULT,
        }
    }
}
