#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-sync** – catch-up/live sync controller.
//!
//! Drives the ingestion pipeline end to end: ask the chain for its tip,
//! compare against the store's watermark, and either work through a bounded
//! backlog (`CatchingUp`) or idle until the next poll (`Live`). Fetching a
//! height's `block`/`block_results` pair is the only step allowed to run
//! concurrently across heights — parsing and dispatch always happen in
//! strict ascending height order, so the watermark never develops a gap.
//! The first time a round reaches `Live`, the controller publishes
//! [`indexer_bus::Notice::CaughtUp`] once; it does not republish on every
//! subsequent poll while still caught up.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use indexer_bus::{EventBus, Notice};
use indexer_dispatcher::{DispatchError, Dispatcher};
use indexer_parser::ParserError;
use indexer_rdb::RdbPool;
use indexer_rpc::{RpcClient, RpcError};
use indexer_store::EventStore;
use indexer_types::{Height, RawBlock, RawBlockResults};
use tokio::sync::watch;

/// Tunable knobs for the sync controller, all with sane production defaults.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of heights processed per catch-up round.
    pub sync_window: u32,
    /// How many heights' `block`/`block_results` fetches may be in flight
    /// at once during catch-up.
    pub max_concurrent_fetches: usize,
    /// How long to sleep between polls once caught up.
    pub poll_interval: Duration,
    /// Retries allowed for one height's RPC fetch before surfacing the error.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling backoff never exceeded regardless of retry count.
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_window: 500,
            max_concurrent_fetches: 8,
            poll_interval: Duration::from_secs(2),
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Where the controller currently sits relative to the chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// The store is behind the chain tip by more than the sync window;
    /// processing a backlog round.
    CatchingUp,
    /// The store has caught up to the chain tip; idling until the next poll.
    Live,
    /// A shutdown signal was observed; the controller is unwinding.
    Stopped,
}

/// Errors raised while driving one sync step.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The chain endpoint could not be reached or returned a bad response,
    /// after exhausting retries.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// A fetched block could not be parsed into commands.
    #[error(transparent)]
    Parser(#[from] ParserError),
    /// The dispatcher failed to commit a height's events.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The store could not be queried for its current watermark.
    #[error(transparent)]
    Store(#[from] indexer_store::StoreError),
    /// The connection pool failed to hand out a transaction.
    #[error(transparent)]
    Rdb(#[from] indexer_rdb::RdbError),
}

/// Drives the ingestion pipeline for one chain endpoint.
pub struct SyncController {
    rpc: RpcClient,
    pool: RdbPool,
    store: EventStore,
    dispatcher: Dispatcher,
    bus: Arc<dyn EventBus>,
    config: SyncConfig,
}

impl SyncController {
    /// Build a controller over `rpc`, using `pool` to read the store's
    /// watermark, `dispatcher` to commit each height, and `bus` to announce
    /// the catch-up-to-live transition.
    pub fn new(
        rpc: RpcClient,
        pool: RdbPool,
        dispatcher: Dispatcher,
        bus: Arc<dyn EventBus>,
        config: SyncConfig,
    ) -> Self {
        Self {
            rpc,
            pool,
            store: EventStore::new(),
            dispatcher,
            bus,
            config,
        }
    }

    /// Run until `shutdown` signals true. A height already in flight when
    /// the signal arrives is allowed to finish committing before the loop
    /// exits, so the watermark is never left mid-height.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        let mut caught_up_notified = false;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.step(&mut shutdown).await? {
                SyncState::Stopped => return Ok(()),
                SyncState::CatchingUp => {
                    caught_up_notified = false;
                    continue;
                }
                SyncState::Live => {
                    if !caught_up_notified {
                        let height = self.local_height().await?;
                        if let Err(err) = self.bus.publish(&Notice::CaughtUp { height }) {
                            tracing::warn!(height, error = %err, "failed to publish caught-up notice");
                        }
                        caught_up_notified = true;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
    }

    /// One iteration: compare the chain tip against the store's watermark
    /// and process at most `sync_window` heights of backlog.
    async fn step(&self, shutdown: &mut watch::Receiver<bool>) -> Result<SyncState, SyncError> {
        let chain_tip = self.rpc.latest_block_height().await?;
        let local = self.local_height().await?;

        if local >= chain_tip {
            return Ok(SyncState::Live);
        }

        let end = catch_up_end(local, chain_tip, self.config.sync_window);
        let heights: Vec<Height> = ((local + 1)..=end).collect();

        let mut fetches = stream::iter(heights.clone())
            .map(|height| self.fetch_with_retry(height))
            .buffered(self.config.max_concurrent_fetches);

        for height in heights {
            if *shutdown.borrow() {
                return Ok(SyncState::Stopped);
            }
            let (raw_block, raw_results) = fetches
                .next()
                .await
                .expect("one fetch result per requested height")?;
            let commands = indexer_parser::parse(raw_block, raw_results)?;
            self.dispatcher.dispatch_height(height, commands).await?;
        }

        Ok(SyncState::CatchingUp)
    }

    async fn local_height(&self) -> Result<Height, SyncError> {
        let mut tx = self.pool.begin().await?;
        let height = self.store.latest_height(&mut tx).await?.unwrap_or(0);
        tx.rollback().await?;
        Ok(height)
    }

    /// Fetch one height's `block`/`block_results` pair, retrying transient
    /// RPC failures with capped exponential backoff before giving up.
    async fn fetch_with_retry(&self, height: Height) -> Result<(RawBlock, RawBlockResults), RpcError> {
        let mut attempt = 0;
        let mut backoff = self.config.initial_backoff;
        loop {
            match self.fetch_once(height).await {
                Ok(pair) => return Ok(pair),
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::warn!(height, attempt, error = %err, "rpc fetch failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, self.config.max_backoff);
                }
            }
        }
    }

    async fn fetch_once(&self, height: Height) -> Result<(RawBlock, RawBlockResults), RpcError> {
        let block = self.rpc.block(height).await?;
        let results = self.rpc.block_results(height).await?;
        Ok((block, results))
    }
}

/// The last height one catch-up round should process: bounded by the sync
/// window, never past the chain tip.
fn catch_up_end(local: Height, chain_tip: Height, window: u32) -> Height {
    (local + window as Height).min(chain_tip)
}

/// Double `current`, capped at `cap`.
fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_up_end_stops_at_window_or_tip() {
        assert_eq!(catch_up_end(0, 10_000, 500), 500);
        assert_eq!(catch_up_end(9_600, 10_000, 500), 10_000);
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let cap = Duration::from_secs(10);
        let mut backoff = Duration::from_millis(200);
        backoff = next_backoff(backoff, cap);
        assert_eq!(backoff, Duration::from_millis(400));
        for _ in 0..10 {
            backoff = next_backoff(backoff, cap);
        }
        assert_eq!(backoff, cap);
    }
}
