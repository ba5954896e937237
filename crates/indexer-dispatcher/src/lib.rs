#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-dispatcher** – the command dispatcher.
//!
//! Turns one height's [`Command`](indexer_parser::Command) list into durable
//! events: begin a transaction, make sure the height's partition exists,
//! assign each command a fresh event id, write the whole batch in one call,
//! commit, and best-effort wake up the projection runtime. Either all of a
//! height's events land, or none do — there is no path that commits a
//! partial batch.

use std::sync::Arc;

use indexer_bus::{EventBus, Notice};
use indexer_event::{
    BlockCreated, Event, MsgMultiSendEvent, MsgSendEvent, MsgSetWithdrawAddressEvent,
    MsgWithdrawDelegatorRewardEvent, MsgWithdrawValidatorCommissionEvent, RawBlockCreated,
    TransactionEvent, UnknownMessageEvent,
};
use indexer_parser::Command;
use indexer_rdb::RdbPool;
use indexer_store::{EventStore, StoreError};
use indexer_types::Height;

/// Schema version stamped on every event this dispatcher produces. Bumped
/// only when a payload shape changes in a way the registry needs to
/// distinguish.
const EVENT_VERSION: u32 = 1;

/// Errors raised while dispatching one height's commands.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The event store rejected the write (or the transaction itself failed).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The connection pool could not hand out or commit a transaction.
    #[error(transparent)]
    Rdb(#[from] indexer_rdb::RdbError),
}

/// Executes one height's worth of commands at a time, each inside its own
/// transaction.
///
/// Stateless beyond its collaborators: the pool it borrows transactions
/// from, the store it writes through, and the bus it wakes projections on.
#[derive(Clone)]
pub struct Dispatcher {
    pool: RdbPool,
    store: EventStore,
    bus: Arc<dyn EventBus>,
}

impl Dispatcher {
    /// Build a dispatcher over `pool`, using the default `events` table and
    /// publishing notices on `bus`.
    pub fn new(pool: RdbPool, bus: Arc<dyn EventBus>) -> Self {
        Self {
            pool,
            store: EventStore::new(),
            bus,
        }
    }

    /// Execute `commands` for `height`: begin a transaction, ensure the
    /// partition exists, write every resulting event in one call, commit,
    /// then publish [`Notice::HeightCommitted`] best-effort. A failure to
    /// publish never fails the dispatch — the event store is already the
    /// source of truth by the time the notice goes out.
    pub async fn dispatch_height(
        &self,
        height: Height,
        commands: Vec<Command>,
    ) -> Result<(), DispatchError> {
        let mut tx = self.pool.begin().await?;

        self.store.ensure_partition_table_exists(&mut tx, height).await?;

        let events: Vec<Box<dyn Event>> = commands
            .into_iter()
            .map(|command| build_event(height, command))
            .collect();

        self.store.insert_all(&mut tx, &events).await?;
        tx.commit().await?;

        if let Err(err) = self.bus.publish(&Notice::HeightCommitted { height }) {
            tracing::warn!(height, error = %err, "failed to publish height-committed notice");
        }

        Ok(())
    }
}

/// Turn one parsed [`Command`] into its corresponding event, assigning a
/// fresh id. A command always yields exactly one event in this model —
/// nothing about executing it is conditional on anything beyond the values
/// it already carries.
fn build_event(height: Height, command: Command) -> Box<dyn Event> {
    let id = uuid::Uuid::new_v4().to_string();
    match command {
        Command::CreateBlock(payload) => Box::new(BlockCreated {
            id,
            height,
            version: EVENT_VERSION,
            payload,
        }),
        Command::CreateRawBlock(payload) => Box::new(RawBlockCreated {
            id,
            height,
            version: EVENT_VERSION,
            payload,
        }),
        Command::CreateTransaction { outcome, payload } => Box::new(TransactionEvent {
            id,
            height,
            version: EVENT_VERSION,
            outcome,
            payload,
        }),
        Command::CreateMsgSend { outcome, payload } => Box::new(MsgSendEvent {
            id,
            height,
            version: EVENT_VERSION,
            outcome,
            payload,
        }),
        Command::CreateMsgMultiSend { outcome, payload } => Box::new(MsgMultiSendEvent {
            id,
            height,
            version: EVENT_VERSION,
            outcome,
            payload,
        }),
        Command::CreateMsgSetWithdrawAddress { outcome, payload } => {
            Box::new(MsgSetWithdrawAddressEvent {
                id,
                height,
                version: EVENT_VERSION,
                outcome,
                payload,
            })
        }
        Command::CreateMsgWithdrawDelegatorReward { outcome, payload } => {
            Box::new(MsgWithdrawDelegatorRewardEvent {
                id,
                height,
                version: EVENT_VERSION,
                outcome,
                payload,
            })
        }
        Command::CreateMsgWithdrawValidatorCommission { outcome, payload } => {
            Box::new(MsgWithdrawValidatorCommissionEvent {
                id,
                height,
                version: EVENT_VERSION,
                outcome,
                payload,
            })
        }
        Command::CreateUnknownMessage { outcome, payload } => Box::new(UnknownMessageEvent {
            id,
            height,
            version: EVENT_VERSION,
            outcome,
            payload,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_event::{BlockCreatedPayload, Outcome, UnknownMessagePayload};
    use indexer_types::Block;

    #[test]
    fn build_event_stamps_height_and_fresh_id() {
        let payload = BlockCreatedPayload {
            block: Block {
                height: 42,
                hash: "h".into(),
                time: chrono::Utc::now(),
                app_hash: "a".into(),
                proposer_address: "p".into(),
                txs: vec![],
                signatures: vec![],
            },
        };
        let a = build_event(42, Command::CreateBlock(payload.clone()));
        let b = build_event(42, Command::CreateBlock(payload));

        assert_eq!(a.height(), 42);
        assert_eq!(a.name(), "BlockCreated");
        assert_ne!(a.id(), b.id(), "each dispatched event gets its own id");
    }

    #[test]
    fn build_event_preserves_outcome_in_name() {
        let payload = UnknownMessagePayload {
            tx_index: 0,
            msg_index: 0,
            type_url: "cosmos-sdk/MsgVote".into(),
            raw: "cg==".into(),
        };
        let failed = build_event(
            7,
            Command::CreateUnknownMessage {
                outcome: Outcome::Failed,
                payload,
            },
        );
        assert_eq!(failed.name(), "UnknownMessage.Failed");
        assert_eq!(failed.height(), 7);
    }
}
