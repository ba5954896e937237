#![forbid(unsafe_code)]

//! **indexer-cli** – process entry point.
//!
//! Wires every crate in the workspace into one running process: ensures the
//! store's schema and the event/projection registries are in place, then
//! starts the Sync Controller, one worker per registered projection, and the
//! HTTP API as independent Tokio tasks sharing a single shutdown signal. A
//! small supervisor awaits all of them and propagates the first failure,
//! rather than letting a dead worker go unnoticed — except a projection
//! round that fails ordinarily (store error, transient dispatch failure)
//! never reaches the supervisor at all: the worker logs it, backs off, and
//! retries the same height from within its own loop. Only a projection
//! being handed an event outside its declared subscription — an invariant
//! violation, not a transient failure — is allowed to fault the process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use indexer_bus::{EventBus, InMemoryBus};
use indexer_dispatcher::Dispatcher;
use indexer_projections::{Projection, ProjectionError};
use indexer_rdb::RdbPool;
use indexer_rpc::RpcClient;
use indexer_store::EventStore;
use indexer_sync::{SyncConfig, SyncController};
use indexer_types::Height;

//─────────────────────────────
//  CLI structure
//─────────────────────────────

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Event-sourced indexer for Tendermint/Cosmos-style chains")]
#[command(version)]
struct Cli {
    /// Base URL of the chain's RPC endpoint.
    #[arg(long, env = "INDEXER_RPC_URL")]
    rpc_url: String,

    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Maximum number of heights the Sync Controller processes per round.
    #[arg(long, env = "INDEXER_SYNC_WINDOW", default_value_t = 500)]
    sync_window: u32,

    /// How long the Sync Controller sleeps between polls once caught up.
    #[arg(long, env = "INDEXER_POLL_INTERVAL_MS", default_value_t = 2_000)]
    poll_interval_ms: u64,

    /// Per-request timeout for the chain RPC client.
    #[arg(long, env = "INDEXER_RPC_TIMEOUT_MS", default_value_t = 10_000)]
    rpc_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port the read-only HTTP API listens on.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Maximum size of the Postgres connection pool.
    #[arg(long, default_value_t = 10)]
    max_db_connections: u32,

    /// Maximum number of heights one projection worker advances per round.
    #[arg(long, default_value_t = 500)]
    projection_batch_limit: Height,

    /// How long an idle projection worker sleeps before checking for more work.
    #[arg(long, default_value_t = 1_000)]
    projection_poll_interval_ms: u64,
}

//─────────────────────────────
//  Main application
//─────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    info!("starting indexer v{}", env!("CARGO_PKG_VERSION"));

    indexer_event::register_events()?;
    indexer_projections::register_projections()?;

    let pool = RdbPool::connect(&cli.database_url, cli.max_db_connections).await?;
    let store = EventStore::new();
    ensure_store_schema(&pool, &store).await?;

    let rpc = RpcClient::with_timeout(cli.rpc_url.clone(), Duration::from_millis(cli.rpc_timeout_ms))?;
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new(1024));
    let dispatcher = Dispatcher::new(pool.clone(), bus.clone());

    let sync_config = SyncConfig {
        sync_window: cli.sync_window,
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        ..SyncConfig::default()
    };
    let controller = SyncController::new(rpc, pool.clone(), dispatcher, bus.clone(), sync_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(run_sync(controller, shutdown_rx.clone())));

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cli.http_port));
    tasks.push(tokio::spawn(run_api(pool.clone(), api_addr, shutdown_rx.clone())));

    for projection in indexer_projections::registered_projections()? {
        info!(projection_id = projection.id(), "starting projection worker");
        tasks.push(tokio::spawn(run_projection_worker(
            pool.clone(),
            store,
            projection,
            cli.projection_batch_limit,
            Duration::from_millis(cli.projection_poll_interval_ms),
            shutdown_rx.clone(),
        )));
    }

    let ctrl_c_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, stopping workers");
        let _ = ctrl_c_shutdown.send(true);
    });

    let mut first_error = None;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(%err, "worker exited with an error");
                if first_error.is_none() {
                    first_error = Some(err);
                }
                let _ = shutdown_tx.send(true);
            }
            Err(join_err) => {
                error!(%join_err, "worker task panicked");
                if first_error.is_none() {
                    first_error = Some(anyhow::Error::from(join_err));
                }
                let _ = shutdown_tx.send(true);
            }
        }
    }

    pool.close().await;
    info!("indexer shut down");

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

//─────────────────────────────
//  Worker bodies
//─────────────────────────────

async fn run_sync(controller: SyncController, shutdown: watch::Receiver<bool>) -> Result<()> {
    controller.run(shutdown).await?;
    Ok(())
}

async fn run_api(pool: RdbPool, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> Result<()> {
    indexer_api::serve(pool, addr, shutdown).await?;
    Ok(())
}

/// Backoff applied after a projection round fails, before retrying the same
/// height. Resets as soon as a round succeeds.
const PROJECTION_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Ceiling the backoff above never exceeds, regardless of how many rounds
/// have failed in a row.
const PROJECTION_MAX_BACKOFF: Duration = Duration::from_secs(30);

async fn run_projection_worker(
    pool: RdbPool,
    store: EventStore,
    projection: Arc<dyn Projection>,
    batch_limit: Height,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    indexer_projections::init_projection(&pool, projection.as_ref()).await?;

    let mut backoff = PROJECTION_INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match indexer_projections::run_projection_once(&pool, &store, projection.as_ref(), batch_limit).await {
            Ok(outcome) => {
                backoff = PROJECTION_INITIAL_BACKOFF;
                if outcome.advanced_to.is_none() {
                    tokio::select! {
                        _ = tokio::time::sleep(poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
            // A projection received an event outside its own declared
            // subscription: a bug in the runtime's filtering, not a
            // transient failure. Retrying the same height would spin
            // forever, so this faults the process like any other worker.
            Err(err @ ProjectionError::UnexpectedEvent { .. }) => return Err(err.into()),
            Err(err) => {
                warn!(
                    projection_id = projection.id(),
                    %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "projection round failed, rolling back and retrying the same height"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {}
                }
                backoff = (backoff * 2).min(PROJECTION_MAX_BACKOFF);
            }
        }
    }
}

//─────────────────────────────
//  Utility functions
//─────────────────────────────

async fn ensure_store_schema(pool: &RdbPool, store: &EventStore) -> Result<()> {
    let mut tx = pool.begin().await?;
    store.ensure_schema(&mut tx).await?;
    tx.commit().await?;
    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
