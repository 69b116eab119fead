//! Error types for event parsing
//!
//! A parse error is never fatal: callers count it and move on to the next
//! line or queue item.

use thiserror::Error;

/// Failure to turn one feed line or queue item into an [`crate::event::Event`].
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("malformed event json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural problems found after the JSON itself decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),

    #[error("event could not be encoded: {0}")]
    Encoding(String),
}
