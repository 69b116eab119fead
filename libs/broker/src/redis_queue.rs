//! Redis list backed work queue.
//!
//! Layout:
//! - `{queue_key}`: waiting items, pushed on the right, popped from the left.
//! - `{queue_key}:processing:{consumer_id}`: items leased by one consumer.
//!
//! `pop` is a blocking `BLMOVE` from the queue into the consumer's processing
//! list, so an item is never only in memory. `ack` removes it with `LREM`.
//! A consumer that crashed leaves its leased items in its processing list;
//! `recover` moves them back to the head of the queue on the next start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::queue::{Delivery, Lease, WorkQueue};

// Atomic check-and-push for bounded queues. Returns -1 when full.
const BOUNDED_PUSH: &str = r"
if redis.call('LLEN', KEYS[1]) >= tonumber(ARGV[2]) then
    return -1
end
return redis.call('RPUSH', KEYS[1], ARGV[1])
";

// BLMOVE treats 0 as "block forever".
const MIN_BLOCK: Duration = Duration::from_millis(1);

/// Configuration for [`RedisQueue`].
#[derive(Debug, Clone)]
pub struct RedisQueueConfig {
    pub queue_key: String,
    /// Owner of the processing list. Must be stable across restarts of the
    /// same consumer for crash recovery to find its leases.
    pub consumer_id: String,
    /// Maximum waiting items; `None` for unbounded.
    pub capacity: Option<usize>,
}

impl Default for RedisQueueConfig {
    fn default() -> Self {
        Self {
            queue_key: "github_events_queue".to_string(),
            consumer_id: "consumer-0".to_string(),
            capacity: None,
        }
    }
}

impl RedisQueueConfig {
    pub fn processing_key(&self) -> String {
        format!("{}:processing:{}", self.queue_key, self.consumer_id)
    }
}

/// Work queue stored in Redis lists.
pub struct RedisQueue {
    conn: MultiplexedConnection,
    config: RedisQueueConfig,
    processing_key: String,
    push_script: Script,
    next_lease: AtomicU64,
}

impl RedisQueue {
    /// Connect and verify the server answers.
    pub async fn connect(redis_url: &str, config: RedisQueueConfig) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        info!(
            queue = %config.queue_key,
            consumer_id = %config.consumer_id,
            capacity = ?config.capacity,
            "Redis queue connected"
        );

        Ok(Self {
            conn,
            processing_key: config.processing_key(),
            config,
            push_script: Script::new(BOUNDED_PUSH),
            next_lease: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &RedisQueueConfig {
        &self.config
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn push(&self, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();

        match self.config.capacity {
            None => {
                let _: i64 = redis::cmd("RPUSH")
                    .arg(&self.config.queue_key)
                    .arg(payload)
                    .query_async(&mut conn)
                    .await?;
            }
            Some(capacity) => {
                let len: i64 = self
                    .push_script
                    .key(&self.config.queue_key)
                    .arg(payload)
                    .arg(capacity)
                    .invoke_async(&mut conn)
                    .await?;
                if len < 0 {
                    return Err(BrokerError::Full { capacity });
                }
            }
        }
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.config.queue_key)
            .arg(&self.processing_key)
            .arg("LEFT")
            .arg("RIGHT")
            .arg(timeout.max(MIN_BLOCK).as_secs_f64())
            .query_async(&mut conn)
            .await?;

        Ok(payload.map(|payload| Delivery {
            lease: Lease {
                id: self.next_lease.fetch_add(1, Ordering::Relaxed),
                receipt: payload.clone(),
            },
            payload,
        }))
    }

    async fn ack(&self, lease: &Lease) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&lease.receipt)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            warn!(lease = lease.id, "Ack found nothing in processing list");
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(&self.config.queue_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn recover(&self) -> Result<usize, BrokerError> {
        let mut conn = self.conn.clone();
        let mut restored = 0usize;

        // Newest leased item first onto the head, which keeps enqueue order.
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.config.queue_key)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            restored += 1;
        }

        if restored > 0 {
            info!(restored, processing = %self.processing_key, "Recovered un-acked items");
        } else {
            debug!(processing = %self.processing_key, "No un-acked items to recover");
        }
        Ok(restored)
    }
}
