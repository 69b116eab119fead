//! Types library for the GitPulse ingestion pipeline
//!
//! This library provides the event model shared by every service: the
//! producer parses feed lines into [`event::Event`], the consumer decodes
//! queue items back into it, and the store persists it.
//!
//! # Modules
//! - `ids`: Event identity (feed id or content digest)
//! - `event`: Event record, kind tags and the tagged payload union
//! - `errors`: Parse error taxonomy

pub mod ids;
pub mod event;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::errors::*;
    pub use crate::event::*;
    pub use crate::ids::*;
}
