//! Realtime Service
//!
//! Subscribes to the fan-out channel and pushes every live event to all
//! connected WebSocket clients.
//!
//! ```text
//! Fan-out channel ─► relay ─► ClientHub ─┬─► client queue ─► socket
//!                                        ├─► client queue ─► socket
//!                                        └─► ...
//! ```
//!
//! Delivery is at-most-once: a client only sees events published while it
//! is connected, and a lagging client loses messages (or its connection)
//! without slowing anyone else down.

pub mod backpressure;
pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod relay;
pub mod server;

pub use backpressure::{ClientQueue, DropPolicy, Frame, Offer};
pub use config::RealtimeConfig;
pub use error::RealtimeError;
pub use hub::{BroadcastReport, ClientHub, ClientId};
pub use metrics::RealtimeMetrics;
pub use relay::{frame_message, run_relay, EVENT_NAME};
pub use server::{create_router, AppState};

pub const SERVICE_NAME: &str = "realtime";
