//! Retention sweeper
//!
//! Runs on block boundaries. Once more than one retention window has passed
//! since the last sweep it drops idle spender buckets and lifts every
//! alert-flood mute so those spenders are tracked again.

use tracing::info;

use crate::ice_phishing::classifier::AddressClassifier;
use crate::ice_phishing::events::BlockEvent;
use crate::ice_phishing::tracker::SpenderStore;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub swept_at: u64,
    pub buckets_removed: usize,
    pub buckets_remaining: usize,
    pub spenders_unmuted: usize,
}

#[derive(Debug)]
pub struct RetentionSweeper {
    retention_window_seconds: u64,
    last_swept: Option<u64>,
}

impl RetentionSweeper {
    pub fn new(retention_window_seconds: u64) -> Self {
        Self {
            retention_window_seconds,
            last_swept: None,
        }
    }

    pub fn last_swept(&self) -> Option<u64> {
        self.last_swept
    }

    /// Whether a block at `timestamp` triggers a sweep. The first block only
    /// starts the clock.
    pub fn is_due(&self, timestamp: u64) -> bool {
        match self.last_swept {
            Some(last) => timestamp.saturating_sub(last) > self.retention_window_seconds,
            None => false,
        }
    }

    pub async fn maybe_sweep(
        &mut self,
        block: &BlockEvent,
        store: &SpenderStore,
        classifier: &AddressClassifier,
    ) -> Option<SweepReport> {
        if self.last_swept.is_none() {
            self.last_swept = Some(block.timestamp);
            return None;
        }
        if !self.is_due(block.timestamp) {
            return None;
        }

        let buckets_removed = store.retain_active(block.timestamp, self.retention_window_seconds);
        let spenders_unmuted = classifier.demote_ignored().await;
        self.last_swept = Some(block.timestamp);

        let report = SweepReport {
            swept_at: block.timestamp,
            buckets_removed,
            buckets_remaining: store.len(),
            spenders_unmuted,
        };
        info!(
            block = block.number,
            buckets_removed,
            buckets_remaining = report.buckets_remaining,
            spenders_unmuted,
            "🧹 Retention sweep completed"
        );
        Some(report)
    }
}
