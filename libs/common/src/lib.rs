//! Shared runtime plumbing for GitPulse services
//!
//! Every binary in the workspace uses the same tracing setup, the same
//! shutdown token wiring and the same retry budget, so they live here.

pub mod cli;
pub mod retry;
pub mod shutdown;
pub mod telemetry;
pub mod time;

pub use retry::{BudgetExhausted, RetryBudget, RetryConfig};
pub use shutdown::{shutdown_token, sleep_or_cancelled};
pub use telemetry::{init_tracing, LogFormat};
pub use time::iso_timestamp;
