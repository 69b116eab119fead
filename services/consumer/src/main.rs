use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use broker::{RedisQueue, RedisQueueConfig, WorkQueue};
use clap::Parser;
use common::cli::{LogArgs, RedisArgs, StoreArgs};
use common::{init_tracing, shutdown_token, RetryConfig};
use consumer::{health_router, BatchConsumer, ConsumerConfig, ConsumerMetrics, SERVICE_NAME};
use store::SqliteStore;
use tokio::net::TcpListener;
use tracing::Instrument;

/// Drain the event queue into the document store.
#[derive(Parser, Debug)]
#[command(name = "consumer", version)]
struct Args {
    #[command(flatten)]
    redis: RedisArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    log: LogArgs,

    /// Events per bulk insert.
    #[arg(long, env = "BATCH_SIZE", default_value_t = 500)]
    batch_size: usize,

    /// Flush a partial batch after this many milliseconds; 0 disables.
    #[arg(long, env = "FLUSH_INTERVAL_MS", default_value_t = 5000)]
    flush_interval_ms: u64,

    /// Stable identity of this consumer; names its processing list.
    #[arg(long, env = "CONSUMER_ID", default_value = "consumer-0")]
    consumer_id: String,

    /// Consecutive failed inserts or pops tolerated before exiting.
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value_t = 10)]
    retry_max_attempts: u32,

    /// Health endpoint port.
    #[arg(long, env = "HEALTH_PORT", default_value_t = 8081)]
    health_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let root = init_tracing(SERVICE_NAME, args.log.log_format);
    run(args).instrument(root).await
}

async fn run(args: Args) -> anyhow::Result<()> {

    let store = SqliteStore::open(&args.store.store_path).context("opening event store")?;
    let queue = RedisQueue::connect(
        &args.redis.redis_url,
        RedisQueueConfig {
            queue_key: args.redis.queue_key.clone(),
            consumer_id: args.consumer_id.clone(),
            capacity: None,
        },
    )
    .await
    .context("connecting to queue")?;

    let recovered = queue.recover().await.context("recovering leased items")?;
    if recovered > 0 {
        tracing::warn!(recovered, "Re-queued items left by a previous run");
    }

    let retry = RetryConfig {
        max_retries: args.retry_max_attempts,
        ..RetryConfig::DEFAULT
    };
    let config = ConsumerConfig {
        batch_size: args.batch_size,
        flush_interval: (args.flush_interval_ms > 0)
            .then(|| Duration::from_millis(args.flush_interval_ms)),
        flush_retry: retry,
        pop_retry: retry,
        ..ConsumerConfig::default()
    };

    let cancel = shutdown_token();
    let metrics = Arc::new(ConsumerMetrics::new());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.health_port));
    let listener = TcpListener::bind(addr).await.context("binding health port")?;
    tracing::info!(port = args.health_port, "Consumer health server running");
    let health = {
        let cancel = cancel.clone();
        let app = health_router(metrics.clone());
        tokio::spawn(
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { cancel.cancelled().await })
                    .await
            }
            .in_current_span(),
        )
    };

    let mut consumer = BatchConsumer::new(Arc::new(queue), Arc::new(store), config, metrics);
    let result = consumer.run(&cancel).await;

    cancel.cancel();
    if let Err(e) = health.await? {
        tracing::warn!(error = %e, "Health server stopped with error");
    }

    result.context("consumer stopped")?;
    Ok(())
}
