use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use broker::{RedisPublisher, RedisQueue, RedisQueueConfig};
use clap::Parser;
use common::cli::{LogArgs, RedisArgs};
use common::{init_tracing, shutdown_token};
use ingest::{FeedClient, IngestConfig, Producer, RunOutcome, DEFAULT_FEED_URL, SERVICE_NAME};
use tracing::Instrument;

/// Download a GitHub Archive hour and push its events into the pipeline.
#[derive(Parser, Debug)]
#[command(name = "ingest", version)]
struct Args {
    #[command(flatten)]
    redis: RedisArgs,

    #[command(flatten)]
    log: LogArgs,

    /// Gzip NDJSON feed URL.
    #[arg(long, env = "GITHUB_ARCHIVE_URL", default_value = DEFAULT_FEED_URL)]
    feed_url: String,

    /// Feed request timeout in seconds.
    #[arg(long, env = "FEED_TIMEOUT_SECS", default_value_t = 60)]
    feed_timeout_secs: u64,

    /// Maximum queued items before pushes wait; 0 for unbounded.
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 0)]
    queue_capacity: usize,

    /// Log progress every this many queued events.
    #[arg(long, env = "PROGRESS_INTERVAL", default_value_t = 1000)]
    progress_interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let root = init_tracing(SERVICE_NAME, args.log.log_format);
    run(args).instrument(root).await
}

async fn run(args: Args) -> anyhow::Result<()> {

    let config = IngestConfig {
        feed_url: args.feed_url.clone(),
        request_timeout: Duration::from_secs(args.feed_timeout_secs),
        progress_interval: args.progress_interval,
        ..IngestConfig::default()
    };

    let queue = RedisQueue::connect(
        &args.redis.redis_url,
        RedisQueueConfig {
            queue_key: args.redis.queue_key.clone(),
            capacity: (args.queue_capacity > 0).then_some(args.queue_capacity),
            ..RedisQueueConfig::default()
        },
    )
    .await
    .context("connecting to queue")?;
    let publisher = RedisPublisher::connect(&args.redis.redis_url, &args.redis.pub_channel)
        .await
        .context("connecting publisher")?;

    tracing::info!(url = %config.feed_url, "Starting ingestion");

    let feed = FeedClient::new(config.clone())?;
    let body = feed.open().await.context("opening feed")?;

    let cancel = shutdown_token();
    let producer = Producer::new(Arc::new(queue), Arc::new(publisher), config);

    match producer.run(body, &cancel).await? {
        RunOutcome::Completed(_) => tracing::info!("Ingest service finished"),
        RunOutcome::Cancelled(report) => {
            tracing::info!(queued = report.queued, "Ingest service stopped early")
        }
    }
    Ok(())
}
