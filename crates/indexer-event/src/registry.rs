//! Process-wide registry mapping `(name, version)` to a decoder for the
//! concrete event type.
//!
//! The registry is populated once at start-up by [`register_events`] and
//! read many times afterwards by the store and projection runtime when they
//! need to turn a persisted `(name, version, bytes)` row back into a
//! `Box<dyn Event>`. The shape — a `Lazy<RwLock<HashMap<_, _>>>` behind a
//! narrow `register`/lookup API — mirrors the kernel's extension registry.

use crate::event::{
    BlockCreated, Event, EventError, MsgMultiSendEvent, MsgSendEvent,
    MsgSetWithdrawAddressEvent, MsgWithdrawDelegatorRewardEvent,
    MsgWithdrawValidatorCommissionEvent, RawBlockCreated, TransactionEvent, UnknownMessageEvent,
};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;

/// A decoder turns the raw bytes of an encoded event into a boxed concrete
/// event. Registered once per `(name, version)` pair.
type Decoder = Box<dyn Fn(&[u8]) -> Result<Box<dyn Event>, EventError> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<(String, u32), Decoder>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Errors raised while registering or looking up a decoder.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No decoder registered for this `(name, version)` pair.
    #[error("no decoder registered for event {name} v{version}")]
    Unknown {
        /// Event name looked up.
        name: String,
        /// Event version looked up.
        version: u32,
    },
    /// A decoder was already registered for this `(name, version)` pair.
    #[error("decoder already registered for event {name} v{version}")]
    AlreadyRegistered {
        /// Event name that collided.
        name: String,
        /// Event version that collided.
        version: u32,
    },
    /// The registered decoder failed to decode the given bytes.
    #[error(transparent)]
    Decode(#[from] EventError),
    /// The registry's internal lock was poisoned by a panicking holder.
    #[error("event registry lock poisoned")]
    LockPoisoned,
}

/// Register a decoder for `(name, version)`. Returns an error if a decoder
/// is already registered for that pair — registration is expected to happen
/// once, at start-up, not to overwrite an existing mapping.
pub fn register(
    name: impl Into<String>,
    version: u32,
    decode: impl Fn(&[u8]) -> Result<Box<dyn Event>, EventError> + Send + Sync + 'static,
) -> Result<(), RegistryError> {
    let name = name.into();
    let mut registry = REGISTRY.write().map_err(|_| RegistryError::LockPoisoned)?;
    if registry.contains_key(&(name.clone(), version)) {
        return Err(RegistryError::AlreadyRegistered { name, version });
    }
    registry.insert((name, version), Box::new(decode));
    Ok(())
}

/// Decode a persisted event row into its concrete boxed form.
pub fn decode_by_type(
    name: &str,
    version: u32,
    bytes: &[u8],
) -> Result<Box<dyn Event>, RegistryError> {
    let registry = REGISTRY.read().map_err(|_| RegistryError::LockPoisoned)?;
    let decode = registry
        .get(&(name.to_string(), version))
        .ok_or_else(|| RegistryError::Unknown {
            name: name.to_string(),
            version,
        })?;
    Ok(decode(bytes)?)
}

fn decode_json<T>(bytes: &[u8]) -> Result<T, EventError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_slice(bytes).map_err(|e| EventError::Decode(e.to_string()))
}

/// Register every known event kind at its current version. Called once
/// during start-up before the store or projections are touched; calling it
/// a second time in the same process returns an error on the first
/// duplicate it hits.
pub fn register_events() -> Result<(), RegistryError> {
    register("BlockCreated", 1, |b| {
        decode_json::<BlockCreated>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("RawBlockCreated", 1, |b| {
        decode_json::<RawBlockCreated>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("TransactionCreated", 1, |b| {
        decode_json::<TransactionEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("TransactionFailed", 1, |b| {
        decode_json::<TransactionEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgSend.Created", 1, |b| {
        decode_json::<MsgSendEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgSend.Failed", 1, |b| {
        decode_json::<MsgSendEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgMultiSend.Created", 1, |b| {
        decode_json::<MsgMultiSendEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgMultiSend.Failed", 1, |b| {
        decode_json::<MsgMultiSendEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgSetWithdrawAddress.Created", 1, |b| {
        decode_json::<MsgSetWithdrawAddressEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgSetWithdrawAddress.Failed", 1, |b| {
        decode_json::<MsgSetWithdrawAddressEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgWithdrawDelegatorReward.Created", 1, |b| {
        decode_json::<MsgWithdrawDelegatorRewardEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgWithdrawDelegatorReward.Failed", 1, |b| {
        decode_json::<MsgWithdrawDelegatorRewardEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgWithdrawValidatorCommission.Created", 1, |b| {
        decode_json::<MsgWithdrawValidatorCommissionEvent>(b)
            .map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("MsgWithdrawValidatorCommission.Failed", 1, |b| {
        decode_json::<MsgWithdrawValidatorCommissionEvent>(b)
            .map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("UnknownMessage.Created", 1, |b| {
        decode_json::<UnknownMessageEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    register("UnknownMessage.Failed", 1, |b| {
        decode_json::<UnknownMessageEvent>(b).map(|e| Box::new(e) as Box<dyn Event>)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{BlockCreatedPayload, Outcome};
    use indexer_types::Block;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn ensure_registered() {
        INIT.call_once(|| {
            register_events().expect("register_events should succeed exactly once per process");
        });
    }

    #[test]
    fn round_trips_block_created() {
        ensure_registered();
        let original = BlockCreated {
            id: "evt-1".into(),
            height: 42,
            version: 1,
            payload: BlockCreatedPayload {
                block: Block {
                    height: 42,
                    hash: "hash".into(),
                    time: chrono::Utc::now(),
                    app_hash: "app".into(),
                    proposer_address: "validator".into(),
                    txs: vec![],
                    signatures: vec![],
                },
            },
        };
        let bytes = original.to_json().unwrap();
        let decoded = decode_by_type(&original.name(), original.version(), &bytes).unwrap();
        assert_eq!(decoded.id(), "evt-1");
        assert_eq!(decoded.height(), 42);
        assert_eq!(decoded.name(), "BlockCreated");
    }

    #[test]
    fn unknown_type_is_rejected() {
        ensure_registered();
        let err = decode_by_type("NoSuchEvent", 1, b"{}").unwrap_err();
        assert!(matches!(err, RegistryError::Unknown { .. }));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        ensure_registered();
        let result = register("BlockCreated", 1, |b| {
            decode_json::<BlockCreated>(b).map(|e| Box::new(e) as Box<dyn Event>)
        });
        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn outcome_suffix_selects_decoder() {
        ensure_registered();
        let payload = crate::event::TransactionPayload {
            tx_index: 0,
            tx: indexer_types::Tx {
                raw: "raw".into(),
                messages: vec![],
                success: false,
                log: "failed".into(),
            },
        };
        let failed = TransactionEvent {
            id: "evt-2".into(),
            height: 7,
            version: 1,
            outcome: Outcome::Failed,
            payload,
        };
        let bytes = failed.to_json().unwrap();
        let decoded = decode_by_type(&failed.name(), failed.version(), &bytes).unwrap();
        assert_eq!(decoded.name(), "TransactionFailed");
    }
}
