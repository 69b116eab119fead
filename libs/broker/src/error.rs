use thiserror::Error;

/// Errors raised by queue and fan-out operations.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("connection failed: {0}")]
    Connection(String),

    /// Bounded queue at capacity. The caller decides whether to wait or give up.
    #[error("queue full: capacity {capacity}")]
    Full { capacity: usize },

    #[error("channel closed")]
    Closed,
}

impl BrokerError {
    pub fn is_full(&self) -> bool {
        matches!(self, BrokerError::Full { .. })
    }
}
