//! Stats Service
//!
//! Read-only JSON API over the persisted events:
//! - `GET /api/overview`
//! - `GET /api/top-repos`
//! - `GET /api/activity`
//! - `GET /health`

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;

pub const SERVICE_NAME: &str = "stats";
