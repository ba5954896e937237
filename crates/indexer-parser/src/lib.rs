#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **indexer-parser** – deterministic block parsing and command building.
//!
//! Turns one height's `(RawBlock, RawBlockResults)` into an ordered list of
//! [`Command`]s. Performs no I/O and consults no store state: given the same
//! inputs it always returns the same output, which is what lets the Sync
//! Controller retry a height safely after a transient failure anywhere
//! downstream.
//!
//! Message decoding assumes the legacy Cosmos SDK amino-JSON transaction
//! encoding used by the original indexer's target chain: each transaction's
//! base64 bytes hold a JSON object of the shape `{"msg": [{"type": ..,
//! "value": ..}]}`. Message kinds this parser does not recognise are never
//! dropped — they become `Command::CreateUnknownMessage`, carrying the raw
//! bytes, so no on-chain activity is silently lost. Transaction logs and
//! unrecognised message payloads are truncated to
//! `indexer_types::{MAX_TX_LOG_LEN, MAX_UNKNOWN_MESSAGE_LEN}` so a
//! pathological block cannot blow up memory use.

use base64::Engine;
use indexer_event::{
    BlockCreatedPayload, MsgMultiSendPayload, MsgSendPayload, MsgSetWithdrawAddressPayload,
    MsgWithdrawDelegatorRewardPayload, MsgWithdrawValidatorCommissionPayload, Outcome,
    RawBlockCreatedPayload, TransactionPayload, UnknownMessagePayload,
};
use indexer_types::{
    validate_height, Block, BlockSignature, Height, Msg, MultiSendIo, RawBlock, RawBlockResults,
    Tx, MAX_TX_LOG_LEN, MAX_UNKNOWN_MESSAGE_LEN,
};
use serde::Deserialize;

/// Errors raised while parsing a block.
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// A transaction's raw bytes were not valid base64.
    #[error("tx {tx_index} is not valid base64: {source}")]
    InvalidBase64 {
        /// Index of the offending transaction within the block.
        tx_index: usize,
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },
    /// A transaction's decoded bytes were not the expected amino-JSON shape.
    #[error("tx {tx_index} is not valid transaction JSON: {source}")]
    InvalidTxJson {
        /// Index of the offending transaction within the block.
        tx_index: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The block's header height did not parse as an integer.
    #[error("invalid block height {height:?}: {source}")]
    InvalidHeight {
        /// The unparsable height string.
        height: String,
        /// Underlying parse error.
        #[source]
        source: std::num::ParseIntError,
    },
    /// The block's header height parsed but failed the store's invariant
    /// (non-negative).
    #[error("invalid block height {height}: {reason}")]
    InvalidHeightValue {
        /// The offending height.
        height: Height,
        /// Why [`validate_height`] rejected it.
        reason: String,
    },
    /// `block_results` did not carry a result for every transaction in the block.
    #[error("block has {block_txs} transactions but block_results has {result_txs}")]
    ResultCountMismatch {
        /// Transactions present in the block.
        block_txs: usize,
        /// Results present in block_results.
        result_txs: usize,
    },
}

/// One unit of work the dispatcher executes to produce zero or more events.
/// Carries everything needed to build the corresponding event's payload
/// except `id` (generated at dispatch time) and `height` (known from the
/// batch the command belongs to).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Emit the block-level `BlockCreated` event.
    CreateBlock(BlockCreatedPayload),
    /// Emit the archival `RawBlockCreated` event.
    CreateRawBlock(RawBlockCreatedPayload),
    /// Emit a `Transaction.{Created,Failed}` event.
    CreateTransaction {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: TransactionPayload,
    },
    /// Emit a `MsgSend.{Created,Failed}` event.
    CreateMsgSend {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: MsgSendPayload,
    },
    /// Emit a `MsgMultiSend.{Created,Failed}` event.
    CreateMsgMultiSend {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: MsgMultiSendPayload,
    },
    /// Emit a `MsgSetWithdrawAddress.{Created,Failed}` event.
    CreateMsgSetWithdrawAddress {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: MsgSetWithdrawAddressPayload,
    },
    /// Emit a `MsgWithdrawDelegatorReward.{Created,Failed}` event.
    CreateMsgWithdrawDelegatorReward {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: MsgWithdrawDelegatorRewardPayload,
    },
    /// Emit a `MsgWithdrawValidatorCommission.{Created,Failed}` event.
    CreateMsgWithdrawValidatorCommission {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: MsgWithdrawValidatorCommissionPayload,
    },
    /// Emit an `UnknownMessage.{Created,Failed}` event for a message kind
    /// this parser does not recognise.
    CreateUnknownMessage {
        /// Success/failure of the enclosing transaction.
        outcome: Outcome,
        /// Event payload.
        payload: UnknownMessagePayload,
    },
}

/// Parse one height's raw RPC responses into a deterministic command
/// sequence. `raw_block` and `raw_results` must be for the same height.
pub fn parse(raw_block: RawBlock, raw_results: RawBlockResults) -> Result<Vec<Command>, ParserError> {
    if raw_block.txs.len() != raw_results.txs_results.len() {
        return Err(ParserError::ResultCountMismatch {
            block_txs: raw_block.txs.len(),
            result_txs: raw_results.txs_results.len(),
        });
    }

    let block = normalize_block(&raw_block, &raw_results)?;

    let mut commands = Vec::new();
    commands.push(Command::CreateBlock(BlockCreatedPayload {
        block: block.clone(),
    }));
    commands.push(Command::CreateRawBlock(RawBlockCreatedPayload {
        raw_block,
    }));

    for (tx_index, tx) in block.txs.into_iter().enumerate() {
        let outcome = if tx.success {
            Outcome::Created
        } else {
            Outcome::Failed
        };

        for (msg_index, msg) in tx.messages.iter().enumerate() {
            commands.push(command_for_message(tx_index, msg_index, outcome, msg));
        }

        commands.push(Command::CreateTransaction {
            outcome,
            payload: TransactionPayload { tx_index, tx },
        });
    }

    Ok(commands)
}

fn command_for_message(tx_index: usize, msg_index: usize, outcome: Outcome, msg: &Msg) -> Command {
    match msg {
        Msg::Send {
            from_address,
            to_address,
            amount,
        } => Command::CreateMsgSend {
            outcome,
            payload: MsgSendPayload {
                tx_index,
                msg_index,
                from_address: from_address.clone(),
                to_address: to_address.clone(),
                amount: amount.clone(),
            },
        },
        Msg::MultiSend { inputs, outputs } => Command::CreateMsgMultiSend {
            outcome,
            payload: MsgMultiSendPayload {
                tx_index,
                msg_index,
                inputs: inputs.clone(),
                outputs: outputs.clone(),
            },
        },
        Msg::SetWithdrawAddress {
            delegator_address,
            withdraw_address,
        } => Command::CreateMsgSetWithdrawAddress {
            outcome,
            payload: MsgSetWithdrawAddressPayload {
                tx_index,
                msg_index,
                delegator_address: delegator_address.clone(),
                withdraw_address: withdraw_address.clone(),
            },
        },
        Msg::WithdrawDelegatorReward {
            delegator_address,
            validator_address,
        } => Command::CreateMsgWithdrawDelegatorReward {
            outcome,
            payload: MsgWithdrawDelegatorRewardPayload {
                tx_index,
                msg_index,
                delegator_address: delegator_address.clone(),
                validator_address: validator_address.clone(),
            },
        },
        Msg::WithdrawValidatorCommission { validator_address } => {
            Command::CreateMsgWithdrawValidatorCommission {
                outcome,
                payload: MsgWithdrawValidatorCommissionPayload {
                    tx_index,
                    msg_index,
                    validator_address: validator_address.clone(),
                },
            }
        }
        Msg::Unknown { type_url, raw } => Command::CreateUnknownMessage {
            outcome,
            payload: UnknownMessagePayload {
                tx_index,
                msg_index,
                type_url: type_url.clone(),
                raw: raw.clone(),
            },
        },
    }
}

fn normalize_block(raw: &RawBlock, results: &RawBlockResults) -> Result<Block, ParserError> {
    let height: Height = raw
        .header
        .height
        .parse()
        .map_err(|source| ParserError::InvalidHeight {
            height: raw.header.height.clone(),
            source,
        })?;
    validate_height(height).map_err(|reason| ParserError::InvalidHeightValue { height, reason })?;

    let mut txs = Vec::with_capacity(raw.txs.len());
    for (tx_index, raw_tx) in raw.txs.iter().enumerate() {
        let result = &results.txs_results[tx_index];
        let messages = decode_tx_messages(tx_index, raw_tx)?;
        txs.push(Tx {
            raw: raw_tx.clone(),
            messages,
            success: result.is_success(),
            log: truncate(result.log.clone(), MAX_TX_LOG_LEN),
        });
    }

    let signatures = raw
        .signatures
        .iter()
        .map(|sig| BlockSignature {
            validator_address: sig.validator_address.clone(),
            timestamp: sig.timestamp,
            is_proposer: sig.validator_address == raw.header.proposer_address,
            signature: sig.signature.clone(),
        })
        .collect();

    Ok(Block {
        height,
        hash: raw.header.hash.clone(),
        time: raw.header.time,
        app_hash: raw.header.app_hash.clone(),
        proposer_address: raw.header.proposer_address.clone(),
        txs,
        signatures,
    })
}

fn decode_tx_messages(tx_index: usize, raw_tx_b64: &str) -> Result<Vec<Msg>, ParserError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw_tx_b64)
        .map_err(|source| ParserError::InvalidBase64 { tx_index, source })?;
    let wire: StdTxWire =
        serde_json::from_slice(&bytes).map_err(|source| ParserError::InvalidTxJson { tx_index, source })?;

    Ok(wire.msg.into_iter().map(decode_msg).collect())
}

fn decode_msg(wire: StdMsgWire) -> Msg {
    let decoded = match wire.type_.as_str() {
        "cosmos-sdk/MsgSend" => serde_json::from_value::<MsgSendWire>(wire.value.clone())
            .ok()
            .map(|w| Msg::Send {
                from_address: w.from_address,
                to_address: w.to_address,
                amount: coins_to_strings(w.amount),
            }),
        "cosmos-sdk/MsgMultiSend" => serde_json::from_value::<MsgMultiSendWire>(wire.value.clone())
            .ok()
            .map(|w| Msg::MultiSend {
                inputs: w.inputs.into_iter().map(MultiSendIoWire::into_io).collect(),
                outputs: w.outputs.into_iter().map(MultiSendIoWire::into_io).collect(),
            }),
        "cosmos-sdk/MsgSetWithdrawAddress" => {
            serde_json::from_value::<MsgSetWithdrawAddressWire>(wire.value.clone())
                .ok()
                .map(|w| Msg::SetWithdrawAddress {
                    delegator_address: w.delegator_address,
                    withdraw_address: w.withdraw_address,
                })
        }
        "cosmos-sdk/MsgWithdrawDelegationReward" => {
            serde_json::from_value::<MsgWithdrawDelegatorRewardWire>(wire.value.clone())
                .ok()
                .map(|w| Msg::WithdrawDelegatorReward {
                    delegator_address: w.delegator_address,
                    validator_address: w.validator_address,
                })
        }
        "cosmos-sdk/MsgWithdrawValidatorCommission" => {
            serde_json::from_value::<MsgWithdrawValidatorCommissionWire>(wire.value.clone())
                .ok()
                .map(|w| Msg::WithdrawValidatorCommission {
                    validator_address: w.validator_address,
                })
        }
        _ => None,
    };

    decoded.unwrap_or_else(|| Msg::Unknown {
        type_url: wire.type_.clone(),
        raw: truncate(
            base64::engine::general_purpose::STANDARD.encode(wire.value.to_string()),
            MAX_UNKNOWN_MESSAGE_LEN,
        ),
    })
}

fn coins_to_strings(coins: Vec<CoinWire>) -> Vec<String> {
    coins
        .into_iter()
        .map(|c| format!("{}{}", c.amount, c.denom))
        .collect()
}

/// Truncate `s` to at most `max_len` bytes, stepping back to the nearest
/// UTF-8 character boundary rather than splitting one.
fn truncate(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[derive(Debug, Deserialize)]
struct StdTxWire {
    #[serde(default)]
    msg: Vec<StdMsgWire>,
}

#[derive(Debug, Deserialize)]
struct StdMsgWire {
    #[serde(rename = "type")]
    type_: String,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CoinWire {
    denom: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct MsgSendWire {
    from_address: String,
    to_address: String,
    amount: Vec<CoinWire>,
}

#[derive(Debug, Deserialize)]
struct MultiSendIoWire {
    address: String,
    coins: Vec<CoinWire>,
}

impl MultiSendIoWire {
    fn into_io(self) -> MultiSendIo {
        MultiSendIo {
            address: self.address,
            amount: coins_to_strings(self.coins),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MsgMultiSendWire {
    inputs: Vec<MultiSendIoWire>,
    outputs: Vec<MultiSendIoWire>,
}

#[derive(Debug, Deserialize)]
struct MsgSetWithdrawAddressWire {
    delegator_address: String,
    withdraw_address: String,
}

#[derive(Debug, Deserialize)]
struct MsgWithdrawDelegatorRewardWire {
    delegator_address: String,
    validator_address: String,
}

#[derive(Debug, Deserialize)]
struct MsgWithdrawValidatorCommissionWire {
    validator_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexer_types::{RawBlockHeader, RawBlockSignature, RawTxResult};

    fn encode_tx(msgs: serde_json::Value) -> String {
        let wire = serde_json::json!({ "msg": msgs });
        base64::engine::general_purpose::STANDARD.encode(wire.to_string())
    }

    fn sample_block(txs: Vec<String>) -> RawBlock {
        RawBlock {
            header: RawBlockHeader {
                chain_id: "testnet".into(),
                height: "100".into(),
                time: chrono::Utc::now(),
                hash: "blockhash".into(),
                app_hash: "apphash".into(),
                proposer_address: "validator-a".into(),
            },
            txs,
            signatures: vec![RawBlockSignature {
                validator_address: "validator-a".into(),
                timestamp: chrono::Utc::now(),
                signature: Some("sig".into()),
            }],
        }
    }

    #[test]
    fn block_with_no_transactions_emits_only_block_level_commands() {
        let raw_block = sample_block(vec![]);
        let raw_results = RawBlockResults {
            height: "100".into(),
            txs_results: vec![],
        };
        let commands = parse(raw_block, raw_results).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], Command::CreateBlock(_)));
        assert!(matches!(commands[1], Command::CreateRawBlock(_)));
    }

    #[test]
    fn msg_send_produces_ordered_message_then_transaction_commands() {
        let tx = encode_tx(serde_json::json!([{
            "type": "cosmos-sdk/MsgSend",
            "value": {
                "from_address": "addr1",
                "to_address": "addr2",
                "amount": [{"denom": "basetcro", "amount": "1000"}]
            }
        }]));
        let raw_block = sample_block(vec![tx]);
        let raw_results = RawBlockResults {
            height: "100".into(),
            txs_results: vec![RawTxResult {
                code: 0,
                log: String::new(),
            }],
        };

        let commands = parse(raw_block, raw_results).unwrap();
        // CreateBlock, CreateRawBlock, CreateMsgSend, CreateTransaction
        assert_eq!(commands.len(), 4);
        match &commands[2] {
            Command::CreateMsgSend { outcome, payload } => {
                assert_eq!(*outcome, Outcome::Created);
                assert_eq!(payload.from_address, "addr1");
                assert_eq!(payload.amount, vec!["1000basetcro".to_string()]);
            }
            other => panic!("expected CreateMsgSend, got {other:?}"),
        }
        assert!(matches!(commands[3], Command::CreateTransaction { outcome: Outcome::Created, .. }));
    }

    #[test]
    fn failed_transaction_yields_failed_outcome() {
        let tx = encode_tx(serde_json::json!([{
            "type": "cosmos-sdk/MsgSend",
            "value": {
                "from_address": "addr1",
                "to_address": "addr2",
                "amount": [{"denom": "basetcro", "amount": "1000"}]
            }
        }]));
        let raw_block = sample_block(vec![tx]);
        let raw_results = RawBlockResults {
            height: "100".into(),
            txs_results: vec![RawTxResult {
                code: 5,
                log: "insufficient funds".into(),
            }],
        };

        let commands = parse(raw_block, raw_results).unwrap();
        assert!(matches!(
            commands[2],
            Command::CreateMsgSend {
                outcome: Outcome::Failed,
                ..
            }
        ));
    }

    #[test]
    fn unrecognised_message_type_is_preserved_not_dropped() {
        let tx = encode_tx(serde_json::json!([{
            "type": "cosmos-sdk/MsgVote",
            "value": {"proposal_id": "1", "voter": "addr1", "option": 1}
        }]));
        let raw_block = sample_block(vec![tx]);
        let raw_results = RawBlockResults {
            height: "100".into(),
            txs_results: vec![RawTxResult {
                code: 0,
                log: String::new(),
            }],
        };

        let commands = parse(raw_block, raw_results).unwrap();
        match &commands[2] {
            Command::CreateUnknownMessage { payload, .. } => {
                assert_eq!(payload.type_url, "cosmos-sdk/MsgVote");
            }
            other => panic!("expected CreateUnknownMessage, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_result_count_is_rejected() {
        let raw_block = sample_block(vec!["dGVzdA==".into()]);
        let raw_results = RawBlockResults {
            height: "100".into(),
            txs_results: vec![],
        };
        let err = parse(raw_block, raw_results).unwrap_err();
        assert!(matches!(err, ParserError::ResultCountMismatch { .. }));
    }

    #[test]
    fn negative_height_is_rejected() {
        let raw_block = sample_block(vec![]);
        let mut raw_block = raw_block;
        raw_block.header.height = "-1".into();
        let raw_results = RawBlockResults {
            height: "-1".into(),
            txs_results: vec![],
        };
        let err = parse(raw_block, raw_results).unwrap_err();
        assert!(matches!(err, ParserError::InvalidHeightValue { height: -1, .. }));
    }

    #[test]
    fn oversized_tx_log_is_truncated() {
        let tx = encode_tx(serde_json::json!([]));
        let raw_block = sample_block(vec![tx]);
        let raw_results = RawBlockResults {
            height: "100".into(),
            txs_results: vec![RawTxResult {
                code: 5,
                log: "x".repeat(MAX_TX_LOG_LEN + 100),
            }],
        };
        let commands = parse(raw_block, raw_results).unwrap();
        match &commands[2] {
            Command::CreateTransaction { payload, .. } => {
                assert_eq!(payload.tx.log.len(), MAX_TX_LOG_LEN);
            }
            other => panic!("expected CreateTransaction, got {other:?}"),
        }
    }

    #[test]
    fn truncate_steps_back_to_char_boundary() {
        let s = "a".repeat(9) + "€"; // '€' is 3 bytes, lands mid-char at max_len=10
        let truncated = truncate(s, 10);
        assert!(truncated.is_char_boundary(truncated.len()));
        assert_eq!(truncated, "a".repeat(9));
    }
}
