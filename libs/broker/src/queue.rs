//! Durable work queue abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrokerError;

/// Proof of an outstanding pop. Hand it back to [`WorkQueue::ack`] once the
/// item is stored; an un-acked item becomes visible again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub(crate) id: u64,
    pub(crate) receipt: String,
}

impl Lease {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// One popped item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Serialized event as pushed.
    pub payload: String,
    pub lease: Lease,
}

/// FIFO work queue with leased delivery.
///
/// Items are dequeued in push order within one queue. Nothing is
/// deduplicated: a redelivered item may reach storage twice.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append to the tail. Fails with [`BrokerError::Full`] on a bounded
    /// queue at capacity.
    async fn push(&self, payload: &str) -> Result<(), BrokerError>;

    /// Remove the head item, waiting at most `timeout` for one to arrive.
    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, BrokerError>;

    /// Mark a popped item as consumed.
    async fn ack(&self, lease: &Lease) -> Result<(), BrokerError>;

    /// Items waiting to be popped (excludes leased items).
    async fn len(&self) -> Result<usize, BrokerError>;

    /// Put every un-acked item owned by this queue handle back at the head.
    /// Returns how many were restored.
    async fn recover(&self) -> Result<usize, BrokerError>;
}
