//! Correlation engine - main entry point
//!
//! Feeds one transaction's decoded approval and transfer events through the
//! classifier, the approval tracker and the transfer correlator, and runs the
//! retention sweeper on block boundaries.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use ethers::types::Address;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::blockchain::traits::{ChainReader, VerificationSource};
use crate::ice_phishing::alerts::Alert;
use crate::ice_phishing::classifier::{AddressClassifier, Classification, Role};
use crate::ice_phishing::config::DetectorConfig;
use crate::ice_phishing::errors::{DetectorError, Result};
use crate::ice_phishing::events::{BlockEvent, TransactionEvent};
use crate::ice_phishing::sweeper::RetentionSweeper;
use crate::ice_phishing::tracker::{
    ApprovalRecord, ApprovalTracker, SpenderStore, TransferCorrelator, TransferRecord,
};
use crate::monitoring::DetectorMetrics;

/// Ice-phishing correlation engine
pub struct CorrelationEngine {
    /// Configuration
    config: DetectorConfig,
    /// Address classification cache
    classifier: AddressClassifier,
    /// Approval bookkeeping
    approvals: ApprovalTracker,
    /// Transfer bookkeeping
    transfers: TransferCorrelator,
    /// Per-spender windows
    store: SpenderStore,
    /// Block-driven retention
    sweeper: tokio::sync::Mutex<RetentionSweeper>,
    /// Optional prometheus metrics
    metrics: Option<Arc<DetectorMetrics>>,
}

/// Classifications resolved for one transaction
#[derive(Default)]
struct Resolved {
    classifications: HashMap<(Address, Role), Classification>,
    /// Addresses whose code check failed; their events are dropped
    failed: HashSet<Address>,
}

impl Resolved {
    fn get(&self, address: Address, role: Role) -> Option<Classification> {
        self.classifications.get(&(address, role)).copied()
    }
}

impl CorrelationEngine {
    /// Create an engine; an invalid configuration refuses to start.
    pub fn new(
        config: DetectorConfig,
        chain: Arc<dyn ChainReader>,
        verifier: Arc<dyn VerificationSource>,
    ) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_capacity).ok_or_else(|| {
            DetectorError::Configuration("cache_capacity must be greater than 0".to_string())
        })?;

        info!(
            approve_count_threshold = config.approve_count_threshold,
            transfer_count_threshold = config.transfer_count_threshold,
            retention_window_seconds = config.retention_window_seconds,
            "🎣 Initializing ice-phishing correlation engine"
        );

        let classifier = AddressClassifier::new(
            chain,
            verifier,
            capacity,
            config.nonce_threshold,
            config.lookup_timeout(),
        );

        Ok(Self {
            approvals: ApprovalTracker::new(config.retention_window_seconds),
            transfers: TransferCorrelator::new(config.retention_window_seconds),
            store: SpenderStore::new(),
            sweeper: tokio::sync::Mutex::new(RetentionSweeper::new(
                config.retention_window_seconds,
            )),
            classifier,
            config,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<DetectorMetrics>) -> Self {
        self.classifier = self.classifier.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn classifier(&self) -> &AddressClassifier {
        &self.classifier
    }

    pub fn store(&self) -> &SpenderStore {
        &self.store
    }

    pub async fn last_swept(&self) -> Option<u64> {
        self.sweeper.lock().await.last_swept()
    }

    /// Process one transaction's decoded events and return the alerts it raised
    pub async fn on_transaction(&self, tx: &TransactionEvent) -> Vec<Alert> {
        let started = Instant::now();
        let mut alerts = Vec::new();

        let records: Vec<ApprovalRecord> = tx
            .approvals
            .iter()
            .filter_map(|event| {
                let record = ApprovalRecord::from_event(event, tx.hash, tx.timestamp);
                if record.is_none() {
                    debug!(tx_hash = ?tx.hash, spender = ?event.spender(), "Revoke ignored");
                }
                record
            })
            .collect();

        let resolved = self.resolve(&records, tx).await;
        let mut muted = HashSet::new();

        for record in records {
            if let Some(alert_batch) = self.handle_approval(record, &resolved, &mut muted).await {
                alerts.extend(alert_batch);
            }
        }

        if tx.approvals.is_empty() && self.config.require_approval_in_transaction {
            debug!(tx_hash = ?tx.hash, "No approvals in transaction, transfer correlation skipped");
        } else if !resolved.failed.contains(&tx.from) {
            alerts.extend(self.handle_transfers(tx).await);
        }

        if let Some(m) = &self.metrics {
            m.record_transaction(started.elapsed().as_secs_f64());
            m.set_tracked_spenders(self.store.len());
            for alert in &alerts {
                m.record_alert(alert);
            }
        }
        alerts
    }

    /// Block boundary; runs the retention sweep when due. Never alerts.
    pub async fn on_block(&self, block: &BlockEvent) -> Vec<Alert> {
        let mut sweeper = self.sweeper.lock().await;
        if let Some(report) = sweeper.maybe_sweep(block, &self.store, &self.classifier).await {
            if let Some(m) = &self.metrics {
                m.record_sweep(report.buckets_removed);
                m.set_tracked_spenders(report.buckets_remaining);
            }
        }
        Vec::new()
    }

    /// Classify every owner and spender of the transaction's approvals.
    ///
    /// Distinct addresses are looked up concurrently; roles of one address run
    /// in sequence and stop at the first code-check failure.
    async fn resolve(&self, records: &[ApprovalRecord], tx: &TransactionEvent) -> Resolved {
        let mut wanted: Vec<(Address, Vec<Role>)> = Vec::new();
        for record in records {
            for (address, role) in [(record.owner, Role::Owner), (record.spender, Role::Spender)] {
                match wanted.iter_mut().find(|(a, _)| *a == address) {
                    Some((_, roles)) if roles.contains(&role) => {}
                    Some((_, roles)) => roles.push(role),
                    None => wanted.push((address, vec![role])),
                }
            }
        }

        let lookups = wanted.into_iter().map(|(address, roles)| async move {
            let mut outcomes = Vec::with_capacity(roles.len());
            for role in roles {
                match self.classifier.classify(address, role, tx.block_number).await {
                    Ok(classification) => outcomes.push((role, Ok(classification))),
                    Err(e) => {
                        outcomes.push((role, Err(e)));
                        break;
                    }
                }
            }
            (address, outcomes)
        });

        let mut resolved = Resolved::default();
        for (address, outcomes) in join_all(lookups).await {
            for (role, outcome) in outcomes {
                match outcome {
                    Ok(classification) => {
                        resolved.classifications.insert((address, role), classification);
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            tx_hash = ?tx.hash,
                            address = ?address,
                            error = %e,
                            "Code check failed, dropping events for address"
                        );
                        resolved.failed.insert(address);
                    }
                    Err(e) => {
                        error!(
                            tx_hash = ?tx.hash,
                            address = ?address,
                            error = %e,
                            "Unexpected classifier failure, dropping events for address"
                        );
                        resolved.failed.insert(address);
                    }
                }
            }
        }
        resolved
    }

    async fn handle_approval(
        &self,
        record: ApprovalRecord,
        resolved: &Resolved,
        muted: &mut HashSet<Address>,
    ) -> Option<Vec<Alert>> {
        let (owner, spender) = (record.owner, record.spender);

        if resolved.failed.contains(&owner) || resolved.failed.contains(&spender) {
            if let Some(m) = &self.metrics {
                m.record_event_dropped();
            }
            return None;
        }
        if muted.contains(&spender) {
            return None;
        }

        let owner_class = resolved.get(owner, Role::Owner)?;
        if !owner_class.is_eoa_owner() {
            debug!(
                owner = ?owner,
                classification = ?owner_class,
                "Approval from non-EOA owner ignored"
            );
            return None;
        }
        let spender_class = resolved.get(spender, Role::Spender)?;
        if !spender_class.is_suspect_spender() {
            debug!(
                spender = ?spender,
                classification = ?spender_class,
                "Approval to benign spender ignored"
            );
            return None;
        }

        let mut alerts = Vec::new();
        let count = {
            let bucket = self.store.bucket(spender);
            let mut bucket = bucket.lock();
            let count = self.approvals.record_approval(&mut bucket, record.clone())?;

            if record.is_approval_for_all {
                alerts.push(Alert::approval_for_all(&record));
            }
            if count > self.config.approve_count_threshold {
                if let Some(summary) = bucket.approval_summary() {
                    alerts.push(Alert::high_num_approvals(
                        spender,
                        &summary,
                        self.config.retention_window_days(),
                    ));
                }
            }
            count
        };

        if let Some(m) = &self.metrics {
            m.record_approval();
        }
        debug!(spender = ?spender, owner = ?owner, count, "Approval tracked");

        if count > self.config.max_address_alerts_per_period {
            self.classifier.mark_ignored(spender).await;
            muted.insert(spender);
        }
        Some(alerts)
    }

    async fn handle_transfers(&self, tx: &TransactionEvent) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let spender = tx.from;

        // Muting only silences approval alerts; drains by a muted spender still count.
        if let Some(record) = self.classifier.cached(&spender).await {
            if !record.classification.to_base().is_suspect_spender() {
                debug!(
                    spender = ?spender,
                    classification = ?record.classification,
                    "Transfers from benign sender skipped"
                );
                return alerts;
            }
        }

        let Some(bucket) = self.store.get(&spender) else {
            return alerts;
        };

        for event in &tx.transfers {
            let record = TransferRecord::from_event(event, tx.hash, tx.timestamp);
            let mut bucket = bucket.lock();
            let correlated =
                self.transfers.record_transfer_if_correlated(&mut bucket, tx.from, record);
            let Some(count) = correlated else {
                continue;
            };

            if let Some(m) = &self.metrics {
                m.record_correlated_transfer();
            }
            debug!(spender = ?spender, count, "Transfer correlated with prior approval");

            if count > self.config.transfer_count_threshold {
                if let Some(summary) = bucket.transfer_summary() {
                    alerts.push(Alert::previously_approved_transfer(
                        spender,
                        &summary,
                        self.config.retention_window_days(),
                    ));
                }
            }
        }
        alerts
    }
}
