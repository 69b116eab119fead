use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use broker::RedisSubscriber;
use clap::Parser;
use common::cli::{LogArgs, RedisArgs};
use common::{init_tracing, shutdown_token};
use realtime::{
    create_router, run_relay, AppState, ClientHub, DropPolicy, RealtimeConfig, RealtimeMetrics,
    SERVICE_NAME,
};
use tokio::net::TcpListener;
use tracing::Instrument;

/// Relay live events to WebSocket viewers.
#[derive(Parser, Debug)]
#[command(name = "realtime", version)]
struct Args {
    #[command(flatten)]
    redis: RedisArgs,

    #[command(flatten)]
    log: LogArgs,

    /// HTTP / WebSocket port.
    #[arg(long, env = "REALTIME_PORT", default_value_t = 4000)]
    port: u16,

    /// Messages buffered per client before the drop policy applies.
    #[arg(long, env = "CLIENT_QUEUE_CAPACITY", default_value_t = 256)]
    client_queue_capacity: usize,

    /// `drop-newest` or `disconnect`.
    #[arg(long, env = "CLIENT_DROP_POLICY", default_value = "drop-newest")]
    drop_policy: DropPolicy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let root = init_tracing(SERVICE_NAME, args.log.log_format);
    run(args).instrument(root).await
}

async fn run(args: Args) -> anyhow::Result<()> {

    let config = RealtimeConfig {
        port: args.port,
        client_queue_capacity: args.client_queue_capacity,
        drop_policy: args.drop_policy,
        ..RealtimeConfig::default()
    };

    let subscriber = RedisSubscriber::new(&args.redis.redis_url, &args.redis.pub_channel)
        .context("configuring subscriber")?;

    let cancel = shutdown_token();
    let metrics = Arc::new(RealtimeMetrics::new());
    let hub = Arc::new(ClientHub::new(
        config.client_queue_capacity,
        config.drop_policy,
        metrics.clone(),
    ));

    let relay = tokio::spawn(run_relay(
        Arc::new(subscriber),
        hub.clone(),
        metrics.clone(),
        config.resubscribe_retry,
        cancel.clone(),
    )
    .in_current_span());

    let app = create_router(AppState {
        hub,
        cancel: cancel.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await.context("binding realtime port")?;
    tracing::info!(port = config.port, "Realtime service running");

    let server = {
        let cancel = cancel.clone();
        tokio::spawn(
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { cancel.cancelled().await })
                    .await
            }
            .in_current_span(),
        )
    };

    // A relay that ran out of resubscribe attempts takes the service down.
    let relay_result = relay.await?;
    cancel.cancel();
    server.await?.context("serving")?;

    relay_result.context("relay stopped")?;
    tracing::info!(metrics = ?metrics.export(), "Realtime service stopped");
    Ok(())
}
