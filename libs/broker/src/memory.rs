//! In-process queue and fan-out channel.
//!
//! Same contracts as the Redis implementations. The queue implements a real
//! visibility timeout: a lease that is not acked within `lease_timeout` puts
//! its item back at the head of the queue.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time::Instant;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::error::BrokerError;
use crate::fanout::{MessageStream, Publisher, Subscriber};
use crate::queue::{Delivery, Lease, WorkQueue};

/// Configuration for [`MemoryQueue`].
#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
    /// Maximum waiting items; `None` for unbounded.
    pub capacity: Option<usize>,
    /// How long a popped item stays invisible before redelivery.
    pub lease_timeout: Duration,
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            lease_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct InFlight {
    payload: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Waiting items with their enqueue sequence.
    ready: VecDeque<(u64, String)>,
    in_flight: HashMap<u64, InFlight>,
    next_sequence: u64,
    redelivered: u64,
}

impl QueueState {
    /// Move expired leases back to the head, oldest first.
    fn reclaim_expired(&mut self, now: Instant) -> usize {
        let mut expired: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.expires_at <= now)
            .map(|(seq, _)| *seq)
            .collect();
        if expired.is_empty() {
            return 0;
        }
        expired.sort_unstable();

        for seq in expired.iter().rev() {
            if let Some(flight) = self.in_flight.remove(seq) {
                self.ready.push_front((*seq, flight.payload));
            }
        }
        self.redelivered += expired.len() as u64;
        expired.len()
    }
}

/// In-memory FIFO work queue with leases.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    config: MemoryQueueConfig,
}

impl MemoryQueue {
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            config,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(MemoryQueueConfig::default())
    }

    pub fn bounded(capacity: usize) -> Self {
        Self::new(MemoryQueueConfig {
            capacity: Some(capacity),
            ..MemoryQueueConfig::default()
        })
    }

    /// Items popped but not yet acked.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Items handed out again after their lease expired or was recovered.
    pub async fn redelivered(&self) -> u64 {
        self.state.lock().await.redelivered
    }

    /// Snapshot of waiting payloads, head first.
    pub async fn snapshot(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .ready
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn push(&self, payload: &str) -> Result<(), BrokerError> {
        {
            let mut state = self.state.lock().await;
            if let Some(capacity) = self.config.capacity {
                if state.ready.len() >= capacity {
                    return Err(BrokerError::Full { capacity });
                }
            }
            let seq = state.next_sequence;
            state.next_sequence += 1;
            state.ready.push_back((seq, payload.to_string()));
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.reclaim_expired(now);

                if let Some((seq, payload)) = state.ready.pop_front() {
                    state.in_flight.insert(
                        seq,
                        InFlight {
                            payload: payload.clone(),
                            expires_at: now + self.config.lease_timeout,
                        },
                    );
                    return Ok(Some(Delivery {
                        payload,
                        lease: Lease {
                            id: seq,
                            receipt: String::new(),
                        },
                    }));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            // notify_one stores a permit, so a push racing this wait is not lost.
            if tokio::time::timeout(deadline - now, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, lease: &Lease) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&lease.id).is_none() {
            // Expired and handed out again; the redelivery carries its own lease.
            debug!(lease = lease.id, "Ack for unknown or expired lease");
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, BrokerError> {
        Ok(self.state.lock().await.ready.len())
    }

    async fn recover(&self) -> Result<usize, BrokerError> {
        let mut state = self.state.lock().await;
        let far_future = Instant::now() + Duration::from_secs(365 * 24 * 3600);
        let restored = state.reclaim_expired(far_future);
        drop(state);

        if restored > 0 {
            self.notify.notify_one();
        }
        Ok(restored)
    }
}

/// In-process fan-out built on a tokio broadcast channel.
pub struct MemoryFanout {
    sender: broadcast::Sender<String>,
}

impl MemoryFanout {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// missing messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryFanout {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Publisher for MemoryFanout {
    async fn publish(&self, message: &str) -> Result<(), BrokerError> {
        // Err only means nobody is listening.
        let _ = self.sender.send(message.to_string());
        Ok(())
    }
}

#[async_trait]
impl Subscriber for MemoryFanout {
    async fn subscribe(&self) -> Result<MessageStream, BrokerError> {
        let stream = BroadcastStream::new(self.sender.subscribe()).filter_map(|item| async move {
            match item {
                Ok(message) => Some(message),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Fan-out subscriber lagged, messages dropped");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}
