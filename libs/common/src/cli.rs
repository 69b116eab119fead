//! Command-line arguments shared between services.
//!
//! Flattened into each binary's own `Args` with `#[command(flatten)]`.

use clap::Args;

use crate::telemetry::LogFormat;

/// Redis connection and key names for the queue and the fan-out channel.
#[derive(Args, Debug, Clone)]
pub struct RedisArgs {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// List key used as the durable work queue.
    #[arg(long, env = "QUEUE_KEY", default_value = "github_events_queue")]
    pub queue_key: String,

    /// Pub/sub channel used for live fan-out.
    #[arg(long, env = "PUB_CHANNEL", default_value = "live_events")]
    pub pub_channel: String,
}

/// Logging options.
#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Log output format: `text` or `json`.
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

/// Document store location.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Path of the SQLite database holding the events collection.
    #[arg(long, env = "STORE_PATH", default_value = "data/github.db")]
    pub store_path: std::path::PathBuf,
}
