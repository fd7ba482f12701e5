//! Address classification cache
//!
//! Resolves owners and spenders to an [`Classification`] and remembers the
//! answer in a bounded LRU. Each address owns its own async slot lock, so
//! concurrent lookups for the same address within a transaction queue up
//! behind a single collaborator query instead of racing on the write-back.
//! Slots still waiting on their first answer live in a side table and only
//! enter the LRU once they hold a record.
//!
//! Cached facts are split into durable ones (`EoaHighNonce`,
//! `VerifiedContract`, `Ignored*`), which are never re-queried, and mutable
//! ones (`EoaLowNonce`, `UnverifiedContract`), which a spender lookup
//! re-checks and may promote. `Unknown` is never stored.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::blockchain::traits::{ChainReader, Verification, VerificationSource};
use crate::ice_phishing::errors::{DetectorError, Result};
use crate::monitoring::DetectorMetrics;

/// What the detector knows about an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    EoaLowNonce,
    /// Busy EOA, most likely an exchange hot wallet
    EoaHighNonce,
    VerifiedContract,
    UnverifiedContract,
    /// Muted EOA spender (alert flood), reverts to `EoaLowNonce` on sweep
    IgnoredEoa,
    /// Muted contract spender, reverts to `UnverifiedContract` on sweep
    IgnoredContract,
    /// Lookup failed; insufficient evidence either way
    Unknown,
}

impl Classification {
    pub fn is_contract(&self) -> bool {
        matches!(
            self,
            Self::VerifiedContract | Self::UnverifiedContract | Self::IgnoredContract
        )
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::IgnoredEoa | Self::IgnoredContract)
    }

    /// Never re-queried once cached
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            Self::EoaHighNonce | Self::VerifiedContract | Self::IgnoredEoa | Self::IgnoredContract
        )
    }

    /// Spenders the engine keeps tracking
    pub fn is_suspect_spender(&self) -> bool {
        matches!(self, Self::EoaLowNonce | Self::UnverifiedContract)
    }

    /// Owners the engine protects
    pub fn is_eoa_owner(&self) -> bool {
        matches!(self, Self::EoaLowNonce | Self::EoaHighNonce | Self::IgnoredEoa)
    }

    /// Muted counterpart of a suspect classification
    pub fn to_ignored(self) -> Option<Self> {
        match self {
            Self::EoaLowNonce => Some(Self::IgnoredEoa),
            Self::UnverifiedContract => Some(Self::IgnoredContract),
            _ => None,
        }
    }

    /// Base classification of a muted one
    pub fn to_base(self) -> Self {
        match self {
            Self::IgnoredEoa => Self::EoaLowNonce,
            Self::IgnoredContract => Self::UnverifiedContract,
            other => other,
        }
    }
}

/// Which side of an approval the address is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Owner,
    Spender,
}

/// Cached classification of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: Address,
    pub classification: Classification,
    /// Last observed transaction count, EOA variants only
    pub cached_nonce: Option<u64>,
    /// Block height of the last evaluation
    pub last_evaluated: u64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type Slot = Arc<tokio::sync::Mutex<Option<AddressRecord>>>;

struct SlotTable {
    /// Slots holding a record; eviction here depends on capacity alone
    resolved: LruCache<Address, Slot>,
    /// Slots whose first lookup has not produced a record yet
    pending: HashMap<Address, Slot>,
}

/// Address classifier backed by an LRU cache
pub struct AddressClassifier {
    chain: Arc<dyn ChainReader>,
    verifier: Arc<dyn VerificationSource>,
    slots: parking_lot::Mutex<SlotTable>,
    nonce_threshold: u64,
    lookup_timeout: Duration,
    metrics: Option<Arc<DetectorMetrics>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AddressClassifier {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        verifier: Arc<dyn VerificationSource>,
        capacity: NonZeroUsize,
        nonce_threshold: u64,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            verifier,
            slots: parking_lot::Mutex::new(SlotTable {
                resolved: LruCache::new(capacity),
                pending: HashMap::new(),
            }),
            nonce_threshold,
            lookup_timeout,
            metrics: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<DetectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Classify `address` in the given role as of `block_number`.
    ///
    /// Returns an error only when the code-presence check fails; the caller
    /// must drop the event rather than guess the address type.
    pub async fn classify(
        &self,
        address: Address,
        role: Role,
        block_number: u64,
    ) -> Result<Classification> {
        let slot = self.slot(address);
        let mut entry = slot.lock().await;

        let outcome = if let Some(record) = entry.as_mut() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if let Some(m) = &self.metrics {
                m.record_cache_lookup(true);
            }
            Ok(self.revalidate(record, role, block_number).await)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            if let Some(m) = &self.metrics {
                m.record_cache_lookup(false);
            }
            match self.resolve(address, role, block_number).await {
                Ok(Some(record)) => {
                    let classification = record.classification;
                    *entry = Some(record);
                    Ok(classification)
                }
                Ok(None) => Ok(Classification::Unknown),
                Err(e) => Err(e),
            }
        };

        let cached = entry.is_some();
        drop(entry);
        self.settle_slot(address, &slot, cached);

        if let Ok(classification) = &outcome {
            debug!(
                address = ?address,
                role = ?role,
                classification = ?classification,
                "Address classified"
            );
        }
        outcome
    }

    /// Mute a suspect spender until the next sweep
    pub async fn mark_ignored(&self, address: Address) -> Option<Classification> {
        let slot = self.slots.lock().resolved.peek(&address).cloned()?;
        let mut entry = slot.lock().await;
        let record = entry.as_mut()?;
        let ignored = record.classification.to_ignored()?;
        record.classification = ignored;
        info!(
            address = ?address,
            classification = ?ignored,
            "🔇 Spender muted for the rest of the retention window"
        );
        Some(ignored)
    }

    /// Revert every muted entry to its base classification
    pub async fn demote_ignored(&self) -> usize {
        let slots: Vec<Slot> =
            self.slots.lock().resolved.iter().map(|(_, slot)| slot.clone()).collect();
        let mut demoted = 0;
        for slot in slots {
            let mut entry = slot.lock().await;
            if let Some(record) = entry.as_mut() {
                if record.classification.is_ignored() {
                    record.classification = record.classification.to_base();
                    demoted += 1;
                }
            }
        }
        demoted
    }

    /// Cached record without touching LRU order or collaborators
    pub async fn cached(&self, address: &Address) -> Option<AddressRecord> {
        let slot = self.slots.lock().resolved.peek(address).cloned()?;
        let entry = slot.lock().await;
        entry.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, address: Address) -> Slot {
        let mut table = self.slots.lock();
        if let Some(slot) = table.resolved.get(&address) {
            return slot.clone();
        }
        // Everyone asking for the same address must get the same slot.
        table
            .pending
            .entry(address)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone()
    }

    /// Move a slot that now holds a record into the LRU, or drop an empty
    /// pending slot nobody else is queued on.
    fn settle_slot(&self, address: Address, slot: &Slot, cached: bool) {
        let mut table = self.slots.lock();
        let is_pending = table
            .pending
            .get(&address)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false);

        if cached {
            if is_pending {
                table.pending.remove(&address);
            }
            if !table.resolved.contains(&address) {
                table.resolved.put(address, slot.clone());
            }
        } else if is_pending && Arc::strong_count(slot) == 2 {
            table.pending.remove(&address);
        }
    }

    async fn revalidate(
        &self,
        record: &mut AddressRecord,
        role: Role,
        block_number: u64,
    ) -> Classification {
        if role == Role::Owner {
            return record.classification;
        }

        match record.classification {
            Classification::EoaLowNonce => {
                match self.transaction_count(record.address, block_number).await {
                    Ok(nonce) => {
                        record.cached_nonce = Some(nonce);
                        record.last_evaluated = block_number;
                        if nonce > self.nonce_threshold {
                            record.classification = Classification::EoaHighNonce;
                            info!(
                                address = ?record.address,
                                nonce,
                                "Spender promoted to high-nonce EOA"
                            );
                        }
                    }
                    // Owner lookups cache without a nonce; no evidence for a spender.
                    Err(e) if record.cached_nonce.is_none() => {
                        warn!(
                            address = ?record.address,
                            error = %e,
                            "Nonce check failed on an owner-only entry, left unclassified"
                        );
                        return Classification::Unknown;
                    }
                    Err(e) => {
                        warn!(
                            address = ?record.address,
                            error = %e,
                            "Nonce re-check failed, keeping cached classification"
                        );
                    }
                }
            }
            Classification::UnverifiedContract => match self.verification(record.address).await {
                Verification::Verified => {
                    record.classification = Classification::VerifiedContract;
                    record.last_evaluated = block_number;
                    info!(address = ?record.address, "Spender contract is now verified");
                }
                Verification::Unverified => record.last_evaluated = block_number,
                Verification::Unknown => {
                    debug!(
                        address = ?record.address,
                        "Verification re-check unavailable, keeping cached classification"
                    );
                }
            },
            _ => {}
        }
        record.classification
    }

    /// Full lookup on a cache miss; `Ok(None)` means `Unknown`
    async fn resolve(
        &self,
        address: Address,
        role: Role,
        block_number: u64,
    ) -> Result<Option<AddressRecord>> {
        let has_code = self.has_code(address, block_number).await?;

        let record = |classification, cached_nonce| AddressRecord {
            address,
            classification,
            cached_nonce,
            last_evaluated: block_number,
        };

        if !has_code {
            if role == Role::Owner {
                return Ok(Some(record(Classification::EoaLowNonce, None)));
            }
            return match self.transaction_count(address, block_number).await {
                Ok(nonce) if nonce > self.nonce_threshold => {
                    Ok(Some(record(Classification::EoaHighNonce, Some(nonce))))
                }
                Ok(nonce) => Ok(Some(record(Classification::EoaLowNonce, Some(nonce)))),
                Err(e) => {
                    warn!(
                        address = ?address,
                        error = %e,
                        "Nonce lookup failed, address left unclassified"
                    );
                    Ok(None)
                }
            };
        }

        match self.verification(address).await {
            Verification::Verified => Ok(Some(record(Classification::VerifiedContract, None))),
            Verification::Unverified => Ok(Some(record(Classification::UnverifiedContract, None))),
            Verification::Unknown => Ok(None),
        }
    }

    async fn has_code(&self, address: Address, block_number: u64) -> Result<bool> {
        let lookup = self.chain.has_code(address, block_number);
        let result = tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| DetectorError::Timeout {
                operation: "has_code",
                timeout_ms: self.lookup_timeout.as_millis() as u64,
            })
            .and_then(|r| r);
        if result.is_err() {
            self.record_collaborator_error("rpc");
        }
        result
    }

    async fn transaction_count(&self, address: Address, block_number: u64) -> Result<u64> {
        let lookup = self.chain.transaction_count(address, block_number);
        let result = tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| DetectorError::Timeout {
                operation: "transaction_count",
                timeout_ms: self.lookup_timeout.as_millis() as u64,
            })
            .and_then(|r| r);
        if result.is_err() {
            self.record_collaborator_error("rpc");
        }
        result
    }

    async fn verification(&self, address: Address) -> Verification {
        let lookup = self.verifier.is_contract_verified(address);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Verification::Unknown) => {
                self.record_collaborator_error("verification");
                Verification::Unknown
            }
            Ok(verification) => verification,
            Err(_) => {
                warn!(
                    address = ?address,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Verification lookup timed out"
                );
                self.record_collaborator_error("verification");
                Verification::Unknown
            }
        }
    }

    fn record_collaborator_error(&self, collaborator: &str) {
        if let Some(m) = &self.metrics {
            m.record_collaborator_error(collaborator);
        }
    }
}
