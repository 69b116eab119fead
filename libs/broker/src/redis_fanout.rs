//! Redis pub/sub backed fan-out channel.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use tracing::{info, warn};

use crate::error::BrokerError;
use crate::fanout::{MessageStream, Publisher, Subscriber};

/// Publishes onto one Redis channel.
pub struct RedisPublisher {
    conn: MultiplexedConnection,
    channel: String,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = channel.into();
        info!(%channel, "Redis publisher connected");
        Ok(Self { conn, channel })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, message: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        // Receiver count; zero is fine.
        let _: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

/// Subscribes to one Redis channel. Each call to `subscribe` opens a
/// dedicated pub/sub connection.
pub struct RedisSubscriber {
    client: redis::Client,
    channel: String,
}

impl RedisSubscriber {
    pub fn new(redis_url: &str, channel: impl Into<String>) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }
}

#[async_trait]
impl Subscriber for RedisSubscriber {
    async fn subscribe(&self) -> Result<MessageStream, BrokerError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        pubsub.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "Subscribed to fan-out channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "Dropping non-text fan-out message");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}
