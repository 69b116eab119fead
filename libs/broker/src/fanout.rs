//! Fan-out channel abstraction.
//!
//! Delivery is at-most-once and unbuffered: a subscriber only sees messages
//! published after [`Subscriber::subscribe`] returned, and publishing with no
//! subscribers is a silent no-op.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BrokerError;

/// Stream of raw messages for one subscription.
pub type MessageStream = BoxStream<'static, String>;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Fire-and-forget publish.
    async fn publish(&self, message: &str) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Register a subscription. It is live once this returns.
    async fn subscribe(&self) -> Result<MessageStream, BrokerError>;
}
