//! Ingest Service
//!
//! Streams one GitHub Archive hour, gunzips and splits it into lines, and
//! feeds every parsed event into the pipeline:
//!
//! ```text
//! HTTP feed ─► gunzip ─► lines ─► parse ─┬─► durable queue (first)
//!                                        └─► fan-out channel (second)
//! ```
//!
//! The run is single-shot: a broken feed stream is not resumed.

pub mod config;
pub mod decoder;
pub mod error;
pub mod feed;
pub mod producer;

pub use config::{IngestConfig, DEFAULT_FEED_URL};
pub use decoder::{DecodedLine, LineDecoder};
pub use error::IngestError;
pub use feed::FeedClient;
pub use producer::{IngestReport, Producer, RunFailure, RunOutcome};

pub const SERVICE_NAME: &str = "ingest";
