use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("store connection poisoned")]
    Poisoned,

    /// Backend refused the call as a whole.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
