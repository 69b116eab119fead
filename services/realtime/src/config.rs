use common::RetryConfig;

use crate::backpressure::DropPolicy;

/// Configuration for the broadcaster.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub port: u16,
    /// Outbound messages buffered per client.
    pub client_queue_capacity: usize,
    pub drop_policy: DropPolicy,
    /// Backoff for re-establishing a lost fan-out subscription.
    pub resubscribe_retry: RetryConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            client_queue_capacity: 256,
            drop_policy: DropPolicy::DropNewest,
            resubscribe_retry: RetryConfig::DEFAULT,
        }
    }
}
