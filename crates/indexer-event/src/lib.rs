#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-event** – the event registry and codec.
//!
//! This crate defines every persisted event kind, the [`Event`] trait they
//! all implement, and the process-wide registry that maps a stored
//! `(name, version)` pair back to a decoder for the concrete type. It has no
//! opinion on *how* events are stored — that lives in `indexer-rdb` and
//! `indexer-store` — only on what an event looks like and how to name,
//! encode, and decode one.

mod event;
mod registry;

pub use event::{
    BlockCreated, BlockCreatedPayload, Event, EventError, MsgMultiSendEvent,
    MsgMultiSendPayload, MsgSendEvent, MsgSendPayload, MsgSetWithdrawAddressEvent,
    MsgSetWithdrawAddressPayload, MsgWithdrawDelegatorRewardEvent,
    MsgWithdrawDelegatorRewardPayload, MsgWithdrawValidatorCommissionEvent,
    MsgWithdrawValidatorCommissionPayload, Outcome, RawBlockCreated, RawBlockCreatedPayload,
    TransactionEvent, TransactionPayload, UnknownMessageEvent, UnknownMessagePayload,
};
pub use registry::{decode_by_type, register, register_events, RegistryError};
