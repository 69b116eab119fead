use broker::BrokerError;
use store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("queue error: {0}")]
    Queue(#[from] BrokerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Too many consecutive failures of one operation. Fatal.
    #[error("{operation} failed {attempts} times in a row, giving up")]
    RetryBudgetExhausted {
        operation: &'static str,
        attempts: u32,
    },
}
