//! Concrete event kinds and the [`Event`] trait they all implement.
//!
//! Each kind mirrors one event family from the chain-indexing domain. Kinds
//! whose payload is shared between a success and a failure outcome (the
//! message-level events) carry an [`Outcome`] field and compute their `name`
//! from it; block-level events have no failure variant and use a fixed name.

use indexer_types::{Block, Height, MultiSendIo, RawBlock, Tx};
use serde::{Deserialize, Serialize};

/// Errors that can occur while encoding or decoding an event payload.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// The payload could not be serialised to JSON.
    #[error("failed to encode event payload: {0}")]
    Encode(String),
    /// The payload could not be deserialised from JSON.
    #[error("failed to decode event payload: {0}")]
    Decode(String),
}

/// Whether a message-level event records success or failure of its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The enclosing transaction succeeded.
    Created,
    /// The enclosing transaction failed.
    Failed,
}

impl Outcome {
    fn suffix(self) -> &'static str {
        match self {
            Outcome::Created => "Created",
            Outcome::Failed => "Failed",
        }
    }
}

/// Behaviour shared by every persisted event kind.
///
/// Implementations are intentionally not object-safe-generic: each concrete
/// struct owns its own `id`/`height`/`version` fields, and `name` is derived
/// from the event kind (and, where applicable, its [`Outcome`]).
pub trait Event: std::fmt::Debug + Send + Sync {
    /// Stable, globally unique identifier for this event.
    fn id(&self) -> &str;
    /// Block height this event was produced at.
    fn height(&self) -> Height;
    /// Stable event name, e.g. `"BlockCreated"` or `"MsgSend.Created"`.
    fn name(&self) -> String;
    /// Schema version for this event's payload.
    fn version(&self) -> u32;
    /// Canonical JSON encoding of the whole event (identity fields and
    /// payload together), so that [`to_json`](Event::to_json) and the
    /// registry's decoder round-trip without external context.
    fn to_json(&self) -> Result<Vec<u8>, EventError>;
    /// Type-erased self-reference, so that a projection can recover the
    /// concrete event struct from a `Box<dyn Event>` via `downcast_ref`
    /// after checking [`name`](Event::name).
    fn as_any(&self) -> &dyn std::any::Any;
}

// Each event struct derives `Serialize`/`Deserialize` on its full shape (not
// just the payload): `to_json` serialises the whole event, and the registry
// decoder deserialises it back into the same concrete type. This is what
// makes the round-trip property (`decode(name, version, to_json(e)) == e`)
// hold without needing side-channel `id`/`height` context at decode time.

macro_rules! impl_event_fixed_name {
    ($ty:ty, $name:expr) => {
        impl Event for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn height(&self) -> Height {
                self.height
            }
            fn name(&self) -> String {
                $name.to_string()
            }
            fn version(&self) -> u32 {
                self.version
            }
            fn to_json(&self) -> Result<Vec<u8>, EventError> {
                serde_json::to_vec(self).map_err(|e| EventError::Encode(e.to_string()))
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

macro_rules! impl_event_outcome_name {
    ($ty:ty, $base:expr) => {
        impl Event for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn height(&self) -> Height {
                self.height
            }
            fn name(&self) -> String {
                format!("{}.{}", $base, self.outcome.suffix())
            }
            fn version(&self) -> u32 {
                self.version
            }
            fn to_json(&self) -> Result<Vec<u8>, EventError> {
                serde_json::to_vec(self).map_err(|e| EventError::Encode(e.to_string()))
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

// Transaction-level events follow the block-level naming convention (no
// dot before the outcome suffix): `TransactionCreated`/`TransactionFailed`.
// The dotted form (`MsgSend.Created`) is reserved for message-level events,
// which are logically nested under their transaction.
macro_rules! impl_event_outcome_name_nodot {
    ($ty:ty, $base:expr) => {
        impl Event for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn height(&self) -> Height {
                self.height
            }
            fn name(&self) -> String {
                format!("{}{}", $base, self.outcome.suffix())
            }
            fn version(&self) -> u32 {
                self.version
            }
            fn to_json(&self) -> Result<Vec<u8>, EventError> {
                serde_json::to_vec(self).map_err(|e| EventError::Encode(e.to_string()))
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

//─────────────────────────────
//  Block-level events (no Failed variant)
//─────────────────────────────

/// Payload of a [`BlockCreated`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockCreatedPayload {
    /// The normalised block.
    pub block: Block,
}

/// Emitted once per height with the fully parsed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockCreated {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Event payload.
    pub payload: BlockCreatedPayload,
}
impl_event_fixed_name!(BlockCreated, "BlockCreated");

/// Payload of a [`RawBlockCreated`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlockCreatedPayload {
    /// The untouched RPC block response, kept for audit/replay.
    pub raw_block: RawBlock,
}

/// Emitted once per height alongside [`BlockCreated`], carrying the raw
/// RPC response for archival purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlockCreated {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Event payload.
    pub payload: RawBlockCreatedPayload,
}
impl_event_fixed_name!(RawBlockCreated, "RawBlockCreated");

//─────────────────────────────
//  Transaction-level events
//─────────────────────────────

/// Payload shared by [`TransactionEvent::Created`] and `::Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPayload {
    /// Index of this transaction within its block.
    pub tx_index: usize,
    /// The decoded transaction.
    pub tx: Tx,
}

/// Emitted once per transaction; the name's suffix (`Created`/`Failed`)
/// mirrors the transaction's execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: TransactionPayload,
}
impl_event_outcome_name_nodot!(TransactionEvent, "Transaction");

//─────────────────────────────
//  Message-level events
//─────────────────────────────

/// Payload shared by `MsgSend.Created`/`MsgSend.Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgSendPayload {
    /// Index of the owning transaction within its block.
    pub tx_index: usize,
    /// Index of this message within its transaction.
    pub msg_index: usize,
    /// Sender address.
    pub from_address: String,
    /// Recipient address.
    pub to_address: String,
    /// Amount transferred.
    pub amount: Vec<String>,
}

/// A bank `MsgSend`, tagged with its transaction's success/failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgSendEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: MsgSendPayload,
}
impl_event_outcome_name!(MsgSendEvent, "MsgSend");

/// Payload shared by `MsgMultiSend.Created`/`MsgMultiSend.Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgMultiSendPayload {
    /// Index of the owning transaction within its block.
    pub tx_index: usize,
    /// Index of this message within its transaction.
    pub msg_index: usize,
    /// Input side of the transfer.
    pub inputs: Vec<MultiSendIo>,
    /// Output side of the transfer.
    pub outputs: Vec<MultiSendIo>,
}

/// A bank `MsgMultiSend`, tagged with its transaction's success/failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgMultiSendEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: MsgMultiSendPayload,
}
impl_event_outcome_name!(MsgMultiSendEvent, "MsgMultiSend");

/// Payload shared by `MsgSetWithdrawAddress.Created`/`.Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgSetWithdrawAddressPayload {
    /// Index of the owning transaction within its block.
    pub tx_index: usize,
    /// Index of this message within its transaction.
    pub msg_index: usize,
    /// Delegator address.
    pub delegator_address: String,
    /// New withdraw address.
    pub withdraw_address: String,
}

/// A distribution `MsgSetWithdrawAddress`, tagged with success/failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgSetWithdrawAddressEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: MsgSetWithdrawAddressPayload,
}
impl_event_outcome_name!(MsgSetWithdrawAddressEvent, "MsgSetWithdrawAddress");

/// Payload shared by `MsgWithdrawDelegatorReward.Created`/`.Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgWithdrawDelegatorRewardPayload {
    /// Index of the owning transaction within its block.
    pub tx_index: usize,
    /// Index of this message within its transaction.
    pub msg_index: usize,
    /// Delegator address.
    pub delegator_address: String,
    /// Validator address rewards are withdrawn from.
    pub validator_address: String,
}

/// A distribution `MsgWithdrawDelegatorReward`, tagged with success/failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgWithdrawDelegatorRewardEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: MsgWithdrawDelegatorRewardPayload,
}
impl_event_outcome_name!(MsgWithdrawDelegatorRewardEvent, "MsgWithdrawDelegatorReward");

/// Payload shared by `MsgWithdrawValidatorCommission.Created`/`.Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgWithdrawValidatorCommissionPayload {
    /// Index of the owning transaction within its block.
    pub tx_index: usize,
    /// Index of this message within its transaction.
    pub msg_index: usize,
    /// Validator address withdrawing its commission.
    pub validator_address: String,
}

/// A distribution `MsgWithdrawValidatorCommission`, tagged with success/failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgWithdrawValidatorCommissionEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: MsgWithdrawValidatorCommissionPayload,
}
impl_event_outcome_name!(
    MsgWithdrawValidatorCommissionEvent,
    "MsgWithdrawValidatorCommission"
);

/// Payload shared by `UnknownMessage.Created`/`.Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownMessagePayload {
    /// Index of the owning transaction within its block.
    pub tx_index: usize,
    /// Index of this message within its transaction.
    pub msg_index: usize,
    /// Message type string as seen on the wire.
    pub type_url: String,
    /// Raw message bytes, base64-encoded.
    pub raw: String,
}

/// A message of a kind the parser does not recognise, tagged with
/// success/failure of its enclosing transaction. Used so the indexer never
/// silently drops unrecognised messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownMessageEvent {
    /// Event identity.
    pub id: String,
    /// Block height.
    pub height: Height,
    /// Payload schema version.
    pub version: u32,
    /// Success/failure discriminator.
    pub outcome: Outcome,
    /// Event payload.
    pub payload: UnknownMessagePayload,
}
impl_event_outcome_name!(UnknownMessageEvent, "UnknownMessage");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_created_name_is_fixed() {
        let e = BlockCreated {
            id: "1".into(),
            height: 1,
            version: 1,
            payload: BlockCreatedPayload {
                block: Block {
                    height: 1,
                    hash: "h".into(),
                    time: chrono::Utc::now(),
                    app_hash: "a".into(),
                    proposer_address: "p".into(),
                    txs: vec![],
                    signatures: vec![],
                },
            },
        };
        assert_eq!(e.name(), "BlockCreated");
    }

    #[test]
    fn msg_send_name_depends_on_outcome() {
        let payload = MsgSendPayload {
            tx_index: 0,
            msg_index: 0,
            from_address: "a".into(),
            to_address: "b".into(),
            amount: vec!["1denom".into()],
        };
        let created = MsgSendEvent {
            id: "1".into(),
            height: 1,
            version: 1,
            outcome: Outcome::Created,
            payload: payload.clone(),
        };
        let failed = MsgSendEvent {
            id: "2".into(),
            height: 1,
            version: 1,
            outcome: Outcome::Failed,
            payload,
        };
        assert_eq!(created.name(), "MsgSend.Created");
        assert_eq!(failed.name(), "MsgSend.Failed");
    }
}
