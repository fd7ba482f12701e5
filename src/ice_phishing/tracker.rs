//! Per-spender approval and transfer history
//!
//! Every spender seen granting-side activity owns a [`SpenderBucket`]: two
//! time-ordered queues (approvals, correlated transfers) that are pruned from
//! the front as records age out of the retention window. The bucket store hands
//! out one lock per spender so different spenders never contend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ice_phishing::events::{ApprovalEvent, TransferEvent};

/// A granted approval kept in a spender's window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub asset: Address,
    pub owner: Address,
    pub spender: Address,
    pub tx_hash: H256,
    pub timestamp: u64,
    /// Set only for single-NFT approvals
    pub token_id: Option<U256>,
    pub is_approval_for_all: bool,
}

impl ApprovalRecord {
    /// Build a record from a decoded event; revocations yield `None`
    pub fn from_event(event: &ApprovalEvent, tx_hash: H256, timestamp: u64) -> Option<Self> {
        if event.is_revoke() {
            return None;
        }
        Some(Self {
            asset: event.asset(),
            owner: event.owner(),
            spender: event.spender(),
            tx_hash,
            timestamp,
            token_id: event.token_id(),
            is_approval_for_all: event.is_approval_for_all(),
        })
    }

    /// Unscoped ERC-20 allowance
    pub fn is_fungible(&self) -> bool {
        self.token_id.is_none() && !self.is_approval_for_all
    }

    /// Whether this approval would let its spender move `transfer`
    pub fn covers(&self, transfer: &TransferRecord) -> bool {
        if self.asset != transfer.asset || self.owner != transfer.owner {
            return false;
        }
        if self.is_approval_for_all {
            return true;
        }
        match (self.token_id, transfer.token_id) {
            (Some(approved), Some(moved)) => approved == moved,
            (None, None) => self.timestamp < transfer.timestamp,
            _ => false,
        }
    }
}

/// A transfer linked to one of the spender's tracked approvals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub asset: Address,
    /// Previous holder
    pub owner: Address,
    pub token_id: Option<U256>,
    pub tx_hash: H256,
    pub timestamp: u64,
}

impl TransferRecord {
    pub fn from_event(event: &TransferEvent, tx_hash: H256, timestamp: u64) -> Self {
        Self {
            asset: event.asset(),
            owner: event.from(),
            token_id: event.token_id(),
            tx_hash,
            timestamp,
        }
    }
}

/// Unit of retention: everything known about one spender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpenderBucket {
    pub spender: Address,
    pub approvals: VecDeque<ApprovalRecord>,
    pub transfers: VecDeque<TransferRecord>,
}

impl SpenderBucket {
    pub fn new(spender: Address) -> Self {
        Self {
            spender,
            approvals: VecDeque::new(),
            transfers: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty() && self.transfers.is_empty()
    }

    /// Timestamp of the most recent record across both queues
    pub fn newest_timestamp(&self) -> Option<u64> {
        let approval = self.approvals.back().map(|a| a.timestamp);
        let transfer = self.transfers.back().map(|t| t.timestamp);
        approval.max(transfer)
    }

    pub fn approval_summary(&self) -> Option<WindowSummary> {
        WindowSummary::build(self.approvals.iter().map(|a| (a.tx_hash, a.asset, a.owner)))
    }

    pub fn transfer_summary(&self) -> Option<WindowSummary> {
        WindowSummary::build(self.transfers.iter().map(|t| (t.tx_hash, t.asset, t.owner)))
    }
}

/// Aggregate view of one queue, used for alert metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSummary {
    pub count: usize,
    pub first_tx_hash: H256,
    pub last_tx_hash: H256,
    pub assets: Vec<Address>,
    pub owners: Vec<Address>,
}

impl WindowSummary {
    fn build(mut items: impl Iterator<Item = (H256, Address, Address)>) -> Option<Self> {
        let (first_tx_hash, asset, owner) = items.next()?;
        let mut summary = Self {
            count: 1,
            first_tx_hash,
            last_tx_hash: first_tx_hash,
            assets: vec![asset],
            owners: vec![owner],
        };
        for (tx_hash, asset, owner) in items {
            summary.count += 1;
            summary.last_tx_hash = tx_hash;
            push_unique(&mut summary.assets, asset);
            push_unique(&mut summary.owners, owner);
        }
        Some(summary)
    }
}

fn push_unique(list: &mut Vec<Address>, address: Address) {
    if !list.contains(&address) {
        list.push(address);
    }
}

/// Pop records from the front while they are older than the window.
///
/// A record exactly `window` seconds old is kept.
fn evict_expired<T>(
    queue: &mut VecDeque<T>,
    now: u64,
    window: u64,
    timestamp: impl Fn(&T) -> u64,
) -> usize {
    let mut evicted = 0;
    while let Some(front) = queue.front() {
        if now.saturating_sub(timestamp(front)) > window {
            queue.pop_front();
            evicted += 1;
        } else {
            break;
        }
    }
    evicted
}

/// Approval-side bookkeeping
#[derive(Debug, Clone, Copy)]
pub struct ApprovalTracker {
    retention_window_seconds: u64,
}

impl ApprovalTracker {
    pub fn new(retention_window_seconds: u64) -> Self {
        Self { retention_window_seconds }
    }

    /// Record an approval; returns the window count, or `None` when the
    /// approval only refreshes an existing ERC-20 allowance.
    pub fn record_approval(
        &self,
        bucket: &mut SpenderBucket,
        record: ApprovalRecord,
    ) -> Option<usize> {
        let now = record.timestamp;
        self.evict_expired(bucket, now);

        if record.is_fungible()
            && bucket
                .approvals
                .iter()
                .any(|a| a.is_fungible() && a.asset == record.asset && a.owner == record.owner)
        {
            debug!(
                spender = ?bucket.spender,
                owner = ?record.owner,
                asset = ?record.asset,
                "Allowance refresh ignored"
            );
            return None;
        }

        bucket.approvals.push_back(record);
        Some(bucket.approvals.len())
    }

    pub fn evict_expired(&self, bucket: &mut SpenderBucket, now: u64) -> usize {
        evict_expired(&mut bucket.approvals, now, self.retention_window_seconds, |a| a.timestamp)
    }
}

/// Transfer-side bookkeeping
#[derive(Debug, Clone, Copy)]
pub struct TransferCorrelator {
    retention_window_seconds: u64,
}

impl TransferCorrelator {
    pub fn new(retention_window_seconds: u64) -> Self {
        Self { retention_window_seconds }
    }

    /// Keep `record` only if one of the bucket's approvals covers it.
    ///
    /// `tx_from` is the transaction's originating account; moves of its own
    /// assets and mints (`from == 0x0`) are never correlated.
    pub fn record_transfer_if_correlated(
        &self,
        bucket: &mut SpenderBucket,
        tx_from: Address,
        record: TransferRecord,
    ) -> Option<usize> {
        if record.owner == tx_from || record.owner.is_zero() {
            return None;
        }

        let now = record.timestamp;
        evict_expired(&mut bucket.approvals, now, self.retention_window_seconds, |a| a.timestamp);

        if !bucket.approvals.iter().any(|a| a.covers(&record)) {
            return None;
        }

        bucket.transfers.push_back(record);
        evict_expired(&mut bucket.transfers, now, self.retention_window_seconds, |t| t.timestamp);
        Some(bucket.transfers.len())
    }
}

/// All spender buckets, one lock per spender
#[derive(Debug, Default)]
pub struct SpenderStore {
    buckets: Mutex<HashMap<Address, Arc<Mutex<SpenderBucket>>>>,
}

impl SpenderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket for `spender`, created on first use
    pub fn bucket(&self, spender: Address) -> Arc<Mutex<SpenderBucket>> {
        self.buckets
            .lock()
            .entry(spender)
            .or_insert_with(|| Arc::new(Mutex::new(SpenderBucket::new(spender))))
            .clone()
    }

    /// Existing bucket only; transfers never create state
    pub fn get(&self, spender: &Address) -> Option<Arc<Mutex<SpenderBucket>>> {
        self.buckets.lock().get(spender).cloned()
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of a bucket's current state
    pub fn snapshot(&self, spender: &Address) -> Option<SpenderBucket> {
        self.get(spender).map(|b| b.lock().clone())
    }

    /// Drop every bucket whose newest record is older than the window.
    /// Returns the number of buckets removed.
    pub fn retain_active(&self, now: u64, window: u64) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| match bucket.lock().newest_timestamp() {
            Some(newest) => now.saturating_sub(newest) <= window,
            None => false,
        });
        let removed = before - buckets.len();
        if removed > 0 {
            buckets.shrink_to_fit();
        }
        removed
    }
}
