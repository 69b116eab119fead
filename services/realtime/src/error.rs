use broker::BrokerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("fan-out subscription failed: {0}")]
    Subscribe(#[from] BrokerError),

    /// The fan-out stream kept ending and resubscribing ran out of retries.
    #[error("fan-out stream closed {attempts} times in a row")]
    StreamEnded { attempts: u32 },
}
