//! Queue and fan-out plumbing
//!
//! Two independent paths leave the producer:
//!
//! ```text
//!            ┌──────────────┐  push / pop+ack   ┌──────────┐
//! Producer ──┤ Durable Queue├──────────────────►│ Consumer │
//!      │     └──────────────┘                   └──────────┘
//!      │     ┌──────────────┐  publish / stream ┌─────────────┐
//!      └─────┤ Fan-out      ├──────────────────►│ Broadcaster │
//!            └──────────────┘                   └─────────────┘
//! ```
//!
//! The queue is FIFO per instance, bounded when configured, and hands out
//! leases that must be acked once the item is durably stored. The fan-out
//! channel is at-most-once and unbuffered.
//!
//! Both paths have a Redis implementation for deployment and an in-memory
//! implementation used by tests and single-process runs.

pub mod error;
pub mod fanout;
pub mod memory;
pub mod queue;
pub mod redis_fanout;
pub mod redis_queue;

pub use error::BrokerError;
pub use fanout::{MessageStream, Publisher, Subscriber};
pub use memory::{MemoryFanout, MemoryQueue, MemoryQueueConfig};
pub use queue::{Delivery, Lease, WorkQueue};
pub use redis_fanout::{RedisPublisher, RedisSubscriber};
pub use redis_queue::{RedisQueue, RedisQueueConfig};
