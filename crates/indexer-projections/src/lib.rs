#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-projections** – the projection runtime.
//!
//! A projection replays committed events into a denormalised, queryable
//! view, tracking its own progress with a durable cursor so that a crash
//! between view-write and cursor-advance never double-applies or drops a
//! height's events. Grounded in the original indexer's `Block` projection
//! (`appinterface/projection/block.go`): one transaction per batch, the
//! cursor updated in that same transaction, and a hard failure — not a
//! silent skip — when a projection is handed an event it never subscribed
//! to.

mod block;
mod cursor;
mod registry;
mod runtime;
mod transaction;

pub use block::BlockProjection;
pub use cursor::{ensure_cursor_table, get_cursor, set_cursor};
pub use registry::{register, register_projections, registered_projections, RegistryError};
pub use runtime::{init_projection, run_projection_once, RunOutcome};
pub use transaction::TransactionProjection;

use indexer_event::Event;
use indexer_rdb::Tx;
use indexer_types::Height;

/// Errors raised while initialising or advancing a projection.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// The underlying database rejected the read or write.
    #[error(transparent)]
    Rdb(#[from] indexer_rdb::RdbError),
    /// The event store reported an error while fetching events.
    #[error(transparent)]
    Store(#[from] indexer_store::StoreError),
    /// A projection was handed an event outside its declared subscription
    /// set. Indicates a bug in the runtime's filtering, never a data issue —
    /// mirrors the original's `received unexpected event` failure.
    #[error("projection {projection_id} received unexpected event {event_name} at height {height}")]
    UnexpectedEvent {
        /// The projection that received the event.
        projection_id: &'static str,
        /// The event's name, e.g. `"MsgSend.Created"`.
        event_name: String,
        /// The height the event was received at.
        height: Height,
    },
}

/// One materialised view, driven forward by the projection runtime.
///
/// Implementations own their view table's schema and writes; the runtime
/// owns batching, the cursor, and transaction boundaries.
#[async_trait::async_trait]
pub trait Projection: Send + Sync {
    /// Stable identifier used as this projection's cursor key. Must not
    /// change across releases — doing so resets the projection to height 0.
    fn id(&self) -> &'static str;

    /// Event names this projection consumes; events outside this set are
    /// never presented to [`handle_events`](Projection::handle_events).
    fn events_to_listen(&self) -> &'static [&'static str];

    /// Idempotent setup, e.g. `CREATE TABLE IF NOT EXISTS`. Called once
    /// before the projection's first batch.
    async fn on_init(&self, tx: &mut Tx) -> Result<(), ProjectionError>;

    /// Apply every event at `height` to the view, within `tx`. The runtime
    /// advances the cursor to `height` in the same transaction immediately
    /// after this returns `Ok`.
    async fn handle_events(
        &self,
        tx: &mut Tx,
        height: Height,
        events: &[Box<dyn Event>],
    ) -> Result<(), ProjectionError>;
}
