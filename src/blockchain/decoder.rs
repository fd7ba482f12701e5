//! Raw log decoding
//!
//! Recognizes the token-standard events the detector cares about. ERC-20 and
//! ERC-721 share the `Approval`/`Transfer` signatures and are told apart by
//! topic count (the ERC-721 token id is indexed). Logs that match a known
//! signature but have the wrong shape are dropped with a warning.

use ethers::types::{Address, Log, H256, U256};
use tracing::warn;

use super::abi::{
    address_from_word, bool_from_word, data_words, topic_from_signature, uint_from_word,
    APPROVAL_FOR_ALL_SIGNATURE, APPROVAL_SIGNATURE, TRANSFER_SIGNATURE, TRANSFER_SINGLE_SIGNATURE,
};
use super::traits::EventDecoder;
use crate::ice_phishing::errors::{DetectorError, Result};
use crate::ice_phishing::events::{ApprovalEvent, TransactionEvent, TransferEvent};

#[derive(Debug, Clone)]
pub struct LogDecoder {
    approval_topic: H256,
    approval_for_all_topic: H256,
    transfer_topic: H256,
    transfer_single_topic: H256,
}

impl Default for LogDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogDecoder {
    pub fn new() -> Self {
        Self {
            approval_topic: topic_from_signature(APPROVAL_SIGNATURE),
            approval_for_all_topic: topic_from_signature(APPROVAL_FOR_ALL_SIGNATURE),
            transfer_topic: topic_from_signature(TRANSFER_SIGNATURE),
            transfer_single_topic: topic_from_signature(TRANSFER_SINGLE_SIGNATURE),
        }
    }

    /// Decode one transaction's receipt logs into a [`TransactionEvent`]
    pub fn decode_transaction(
        &self,
        hash: H256,
        from: Address,
        block_number: u64,
        timestamp: u64,
        logs: &[Log],
    ) -> TransactionEvent {
        TransactionEvent {
            approvals: self.decode_approval_events(logs),
            transfers: self.decode_transfer_events(logs),
            ..TransactionEvent::new(hash, from, block_number, timestamp)
        }
    }

    /// `Ok(None)` for logs that are not approval-class events
    pub fn decode_approval(&self, log: &Log) -> Result<Option<ApprovalEvent>> {
        let Some(signature) = log.topics.first() else {
            return Ok(None);
        };
        let asset = log.address;

        if *signature == self.approval_topic {
            return match log.topics.len() {
                3 => Ok(Some(ApprovalEvent::Erc20 {
                    asset,
                    owner: topic_address(log, 1)?,
                    spender: topic_address(log, 2)?,
                    value: data_value(log)?,
                })),
                4 => Ok(Some(ApprovalEvent::Erc721 {
                    asset,
                    owner: topic_address(log, 1)?,
                    spender: topic_address(log, 2)?,
                    token_id: topic_token_id(log)?,
                })),
                _ => Err(malformed(log, "topic count")),
            };
        }

        if *signature == self.approval_for_all_topic {
            if log.topics.len() != 3 {
                return Err(malformed(log, "topic count"));
            }
            return Ok(Some(ApprovalEvent::ApprovalForAll {
                asset,
                owner: topic_address(log, 1)?,
                operator: topic_address(log, 2)?,
                approved: single_word(log)
                    .and_then(bool_from_word)
                    .ok_or_else(|| malformed(log, "approved flag"))?,
            }));
        }

        Ok(None)
    }

    /// `Ok(None)` for logs that are not transfer-class events
    pub fn decode_transfer(&self, log: &Log) -> Result<Option<TransferEvent>> {
        let Some(signature) = log.topics.first() else {
            return Ok(None);
        };
        let asset = log.address;

        if *signature == self.transfer_topic {
            return match log.topics.len() {
                3 => Ok(Some(TransferEvent::Erc20 {
                    asset,
                    from: topic_address(log, 1)?,
                    to: topic_address(log, 2)?,
                    value: data_value(log)?,
                })),
                4 => Ok(Some(TransferEvent::Erc721 {
                    asset,
                    from: topic_address(log, 1)?,
                    to: topic_address(log, 2)?,
                    token_id: topic_token_id(log)?,
                })),
                _ => Err(malformed(log, "topic count")),
            };
        }

        if *signature == self.transfer_single_topic {
            if log.topics.len() != 4 {
                return Err(malformed(log, "topic count"));
            }
            let words = data_words(&log.data)
                .filter(|w| w.len() == 2)
                .ok_or_else(|| malformed(log, "id/value data"))?;
            return Ok(Some(TransferEvent::Erc1155 {
                asset,
                operator: topic_address(log, 1)?,
                from: topic_address(log, 2)?,
                to: topic_address(log, 3)?,
                token_id: uint_from_word(words[0]).ok_or_else(|| malformed(log, "id"))?,
                value: uint_from_word(words[1]).ok_or_else(|| malformed(log, "value"))?,
            }));
        }

        Ok(None)
    }
}

impl EventDecoder for LogDecoder {
    fn decode_approval_events(&self, logs: &[Log]) -> Vec<ApprovalEvent> {
        logs.iter()
            .filter_map(|log| match self.decode_approval(log) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        tx_hash = ?log.transaction_hash,
                        asset = ?log.address,
                        error = %e,
                        "Dropping malformed approval log"
                    );
                    None
                }
            })
            .collect()
    }

    fn decode_transfer_events(&self, logs: &[Log]) -> Vec<TransferEvent> {
        logs.iter()
            .filter_map(|log| match self.decode_transfer(log) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        tx_hash = ?log.transaction_hash,
                        asset = ?log.address,
                        error = %e,
                        "Dropping malformed transfer log"
                    );
                    None
                }
            })
            .collect()
    }
}

fn topic_address(log: &Log, index: usize) -> Result<Address> {
    log.topics
        .get(index)
        .and_then(|topic| address_from_word(topic.as_bytes()))
        .ok_or_else(|| malformed(log, "indexed address"))
}

/// The only data word of a log whose payload is exactly one word
fn single_word(log: &Log) -> Option<&[u8]> {
    data_words(&log.data).filter(|w| w.len() == 1).map(|w| w[0])
}

fn data_value(log: &Log) -> Result<U256> {
    single_word(log).and_then(uint_from_word).ok_or_else(|| malformed(log, "value"))
}

/// Indexed ERC-721 token id (fourth topic)
fn topic_token_id(log: &Log) -> Result<U256> {
    log.topics
        .get(3)
        .and_then(|topic| uint_from_word(topic.as_bytes()))
        .ok_or_else(|| malformed(log, "token id"))
}

fn malformed(log: &Log, field: &str) -> DetectorError {
    DetectorError::MalformedEvent(format!(
        "{:?} log from {:?}: bad {}",
        log.topics.first(),
        log.address,
        field
    ))
}
