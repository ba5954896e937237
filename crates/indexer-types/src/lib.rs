#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-types** – Shared primitive data structures for the chain indexer.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It intentionally makes no assumptions about I/O, storage, or the event
//! registry — it only describes the shapes that flow between them.

use serde::{Deserialize, Serialize};

//─────────────────────────────
//  Height
//─────────────────────────────

/// Block height. Non-negative by invariant; see [`validate_height`].
pub type Height = i64;

/// Validate that a height is well-formed (non-negative).
pub fn validate_height(height: Height) -> Result<(), String> {
    if height < 0 {
        return Err(format!("height must be non-negative, got {height}"));
    }
    Ok(())
}

//─────────────────────────────
//  Size limits
//─────────────────────────────

/// Maximum length of a raw, unrecognised message payload captured verbatim
/// by the parser's `UnknownMessage` fallback, to bound memory use on
/// pathological blocks.
pub const MAX_UNKNOWN_MESSAGE_LEN: usize = 1_048_576;

/// Maximum length of a transaction log string retained from `block_results`.
pub const MAX_TX_LOG_LEN: usize = 65_536;

//─────────────────────────────
//  Chain wire types (raw RPC shapes)
//─────────────────────────────

/// Raw `/block` RPC response body, as returned by the chain endpoint.
///
/// This mirrors the wire shape closely enough to parse losslessly; deeply
/// nested consensus fields the indexer never reads (evidence, last-commit
/// round, etc.) are intentionally flattened away rather than modelled 1:1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    /// Block header fields.
    pub header: RawBlockHeader,
    /// Base64-encoded transaction bytes, in block order.
    pub txs: Vec<String>,
    /// Commit signatures for the *previous* block, attached to this one.
    pub signatures: Vec<RawBlockSignature>,
}

/// Raw block header fields consumed by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlockHeader {
    /// Chain identifier.
    pub chain_id: String,
    /// Height, encoded as a decimal string on the wire (Tendermint convention).
    pub height: String,
    /// Block time, RFC3339.
    pub time: chrono::DateTime<chrono::Utc>,
    /// Block hash.
    pub hash: String,
    /// Application state root hash after this block.
    pub app_hash: String,
    /// Address of the proposer of this block.
    pub proposer_address: String,
}

/// A single commit signature entry from `/block`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlockSignature {
    /// Validator address that produced (or skipped) this signature.
    pub validator_address: String,
    /// Timestamp the validator signed at.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// `None` when the validator did not sign (absent/nil vote).
    pub signature: Option<String>,
}

/// Raw `/block_results` RPC response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBlockResults {
    /// Height these results belong to, decimal string on the wire.
    pub height: String,
    /// Per-transaction execution results, in block order.
    pub txs_results: Vec<RawTxResult>,
}

/// Execution result for a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTxResult {
    /// Zero on success; any non-zero value indicates failure.
    pub code: u32,
    /// Human-readable execution log (possibly empty on success).
    #[serde(default)]
    pub log: String,
}

impl RawTxResult {
    /// Whether this transaction succeeded.
    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

//─────────────────────────────
//  Normalised domain types
//─────────────────────────────

/// A parsed, height-normalised block — the unit the parser consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Block height.
    pub height: Height,
    /// Block hash.
    pub hash: String,
    /// Block time.
    pub time: chrono::DateTime<chrono::Utc>,
    /// Application hash after this block.
    pub app_hash: String,
    /// Proposer address for this block.
    pub proposer_address: String,
    /// Decoded transaction envelopes, in block order.
    pub txs: Vec<Tx>,
    /// Commit signatures attached to this block.
    pub signatures: Vec<BlockSignature>,
}

/// A single commit signature, normalised from [`RawBlockSignature`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSignature {
    /// Validator address.
    pub validator_address: String,
    /// Signing timestamp.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Whether this validator proposed the block.
    pub is_proposer: bool,
    /// `None` when the validator did not sign.
    pub signature: Option<String>,
}

/// A decoded transaction: one or more messages plus its execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    /// Base64-encoded raw transaction bytes (kept for hashing/audit).
    pub raw: String,
    /// Messages carried by this transaction, in message-index order.
    pub messages: Vec<Msg>,
    /// Whether the transaction succeeded, per `block_results`.
    pub success: bool,
    /// Execution log, truncated to [`MAX_TX_LOG_LEN`].
    pub log: String,
}

/// A single message extracted from a transaction.
///
/// Only the message *kind* and its already-decoded fields are modelled here;
/// unrecognised kinds are carried as [`Msg::Unknown`] rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Msg {
    /// `cosmos-sdk/MsgSend`.
    Send {
        /// Sender address.
        from_address: String,
        /// Recipient address.
        to_address: String,
        /// Amount, as `"<amount><denom>"` strings (wire-preserving).
        amount: Vec<String>,
    },
    /// `cosmos-sdk/MsgMultiSend`.
    MultiSend {
        /// Input side of the transfer.
        inputs: Vec<MultiSendIo>,
        /// Output side of the transfer.
        outputs: Vec<MultiSendIo>,
    },
    /// `cosmos-sdk/MsgSetWithdrawAddress`.
    SetWithdrawAddress {
        /// Delegator address.
        delegator_address: String,
        /// New withdraw address.
        withdraw_address: String,
    },
    /// `cosmos-sdk/MsgWithdrawDelegatorReward`.
    WithdrawDelegatorReward {
        /// Delegator address.
        delegator_address: String,
        /// Validator address rewards are withdrawn from.
        validator_address: String,
    },
    /// `cosmos-sdk/MsgWithdrawValidatorCommission`.
    WithdrawValidatorCommission {
        /// Validator address withdrawing its commission.
        validator_address: String,
    },
    /// Any message kind the parser does not recognise. Carried verbatim
    /// (truncated to [`MAX_UNKNOWN_MESSAGE_LEN`]) so no data is silently
    /// dropped.
    Unknown {
        /// Message type string as seen on the wire.
        type_url: String,
        /// Raw message bytes, base64-encoded.
        raw: String,
    },
}

/// One side (input or output) of a `MsgMultiSend`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSendIo {
    /// Account address.
    pub address: String,
    /// Amount, as `"<amount><denom>"` strings.
    pub amount: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_height_rejects_negative() {
        assert!(validate_height(-1).is_err());
        assert!(validate_height(0).is_ok());
        assert!(validate_height(100).is_ok());
    }

    #[test]
    fn raw_tx_result_success() {
        let ok = RawTxResult { code: 0, log: String::new() };
        let failed = RawTxResult { code: 5, log: "insufficient funds".into() };
        assert!(ok.is_success());
        assert!(!failed.is_success());
    }
}
