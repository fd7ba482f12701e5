//! Shared fixtures for integration tests: in-memory collaborators with call
//! counters and small event builders.
#![allow(dead_code)]

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use ice_phishing_detector::blockchain::traits::{ChainReader, Verification, VerificationSource};
use ice_phishing_detector::ice_phishing::{
    ApprovalEvent, CorrelationEngine, DetectorConfig, DetectorError, Result, TransactionEvent,
    TransferEvent,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

/// Chain state served from memory
#[derive(Default)]
pub struct MockChain {
    contracts: Mutex<HashSet<Address>>,
    nonces: Mutex<HashMap<Address, u64>>,
    failing: Mutex<HashSet<Address>>,
    nonce_failing: Mutex<HashSet<Address>>,
    delay: Mutex<Option<Duration>>,
    code_calls: Mutex<HashMap<Address, usize>>,
    nonce_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_contract(&self, address: Address) {
        self.contracts.lock().insert(address);
    }

    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.nonces.lock().insert(address, nonce);
    }

    /// Make `eth_getCode` fail for `address`
    pub fn fail_code_check(&self, address: Address) {
        self.failing.lock().insert(address);
    }

    /// Make `eth_getTransactionCount` fail for `address`
    pub fn fail_nonce_check(&self, address: Address) {
        self.nonce_failing.lock().insert(address);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn code_calls(&self, address: Address) -> usize {
        self.code_calls.lock().get(&address).copied().unwrap_or(0)
    }

    pub fn total_code_calls(&self) -> usize {
        self.code_calls.lock().values().sum()
    }

    pub fn nonce_calls(&self) -> usize {
        self.nonce_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn has_code(&self, address: Address, _block_number: u64) -> Result<bool> {
        *self.code_calls.lock().entry(address).or_default() += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&address) {
            return Err(DetectorError::collaborator("rpc", "connection reset"));
        }
        Ok(self.contracts.lock().contains(&address))
    }

    async fn transaction_count(&self, address: Address, _block_number: u64) -> Result<u64> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        if self.nonce_failing.lock().contains(&address) {
            return Err(DetectorError::collaborator("rpc", "connection reset"));
        }
        Ok(self.nonces.lock().get(&address).copied().unwrap_or(1))
    }
}

/// Verification registry served from memory
pub struct MockVerifier {
    verified: Mutex<HashSet<Address>>,
    unavailable: Mutex<bool>,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            verified: Mutex::new(HashSet::new()),
            unavailable: Mutex::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn verify(&self, address: Address) {
        self.verified.lock().insert(address);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationSource for MockVerifier {
    async fn is_contract_verified(&self, address: Address) -> Verification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.unavailable.lock() {
            Verification::Unknown
        } else if self.verified.lock().contains(&address) {
            Verification::Verified
        } else {
            Verification::Unverified
        }
    }
}

pub fn new_engine(
    config: DetectorConfig,
    chain: &Arc<MockChain>,
    verifier: &Arc<MockVerifier>,
) -> CorrelationEngine {
    CorrelationEngine::new(config, chain.clone(), verifier.clone()).unwrap()
}

pub fn erc20_approval(
    asset: Address,
    owner: Address,
    spender: Address,
    value: u64,
) -> ApprovalEvent {
    ApprovalEvent::Erc20 { asset, owner, spender, value: U256::from(value) }
}

pub fn approval_for_all(
    asset: Address,
    owner: Address,
    operator: Address,
    approved: bool,
) -> ApprovalEvent {
    ApprovalEvent::ApprovalForAll { asset, owner, operator, approved }
}

pub fn erc20_transfer(asset: Address, from: Address, to: Address, value: u64) -> TransferEvent {
    TransferEvent::Erc20 { asset, from, to, value: U256::from(value) }
}

pub fn erc721_transfer(
    asset: Address,
    from: Address,
    to: Address,
    token_id: u64,
) -> TransferEvent {
    TransferEvent::Erc721 { asset, from, to, token_id: U256::from(token_id) }
}

/// Transaction `n` sent by `from` at `timestamp`
pub fn tx(n: u64, from: Address, timestamp: u64) -> TransactionEvent {
    TransactionEvent::new(hash(n), from, 1_000 + n, timestamp)
}
