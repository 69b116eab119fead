//! Producer error taxonomy.
//!
//! Everything here ends the run. Per-line parse failures and fan-out
//! publish failures are counted in the report instead.

use broker::BrokerError;
use common::BudgetExhausted;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("feed stream failed: {0}")]
    Stream(String),

    #[error("feed is not valid gzip: {0}")]
    Decode(#[from] std::io::Error),

    #[error("queue push failed: {source}")]
    Queue {
        source: BrokerError,
        budget: BudgetExhausted,
    },
}
