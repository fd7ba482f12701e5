use async_trait::async_trait;
use ethers::types::{Address, Log};
use serde::{Deserialize, Serialize};

use crate::ice_phishing::errors::Result;
use crate::ice_phishing::events::{ApprovalEvent, TransferEvent};

/// Read-only chain state the classifier needs.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Whether `address` has deployed bytecode at `block_number`.
    async fn has_code(&self, address: Address, block_number: u64) -> Result<bool>;

    /// Number of transactions sent by `address` as of `block_number`.
    async fn transaction_count(&self, address: Address, block_number: u64) -> Result<u64>;
}

/// Outcome of a source-verification lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verification {
    Verified,
    Unverified,
    /// Lookup failed or was rate limited
    Unknown,
}

/// Source-verification registry (block explorer or similar).
#[async_trait]
pub trait VerificationSource: Send + Sync {
    /// Never fails; unavailability is reported as [`Verification::Unknown`].
    async fn is_contract_verified(&self, address: Address) -> Verification;
}

/// Turns raw receipt logs into typed events.
pub trait EventDecoder: Send + Sync {
    fn decode_approval_events(&self, logs: &[Log]) -> Vec<ApprovalEvent>;

    fn decode_transfer_events(&self, logs: &[Log]) -> Vec<TransferEvent>;
}
