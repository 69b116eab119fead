use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::cli::{LogArgs, StoreArgs};
use common::{init_tracing, shutdown_token};
use stats::{create_router, AppState, SERVICE_NAME};
use store::SqliteStore;
use tokio::net::TcpListener;
use tracing::Instrument;

/// Serve aggregate analytics over the event store.
#[derive(Parser, Debug)]
#[command(name = "stats", version)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    log: LogArgs,

    /// HTTP port.
    #[arg(long, env = "STATS_PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let root = init_tracing(SERVICE_NAME, args.log.log_format);
    run(args).instrument(root).await
}

async fn run(args: Args) -> Result<(), anyhow::Error> {

    let store = SqliteStore::open(&args.store.store_path).context("opening event store")?;
    let state = AppState::new(Arc::new(store));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(port = args.port, "Stats service running");

    let cancel = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}
