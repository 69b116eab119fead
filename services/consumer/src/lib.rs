//! Consumer Service
//!
//! Drains the durable queue into bounded batches and bulk-writes them to
//! the event store. Each consumer owns its batch; several consumers may
//! share one queue.

pub mod batch;
pub mod config;
pub mod consumer;
pub mod error;
pub mod health;
pub mod metrics;

pub use batch::{Batch, BatchFull};
pub use config::ConsumerConfig;
pub use consumer::{BatchConsumer, ConsumerState, FlushResult};
pub use error::ConsumerError;
pub use health::health_router;
pub use metrics::ConsumerMetrics;

pub const SERVICE_NAME: &str = "consumer";
