//! Alerts raised by the correlation engine

use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::ice_phishing::tracker::{ApprovalRecord, WindowSummary};

pub const HIGH_NUM_APPROVALS_ALERT_ID: &str = "ICE-PHISHING-HIGH-NUM-APPROVALS";
pub const APPROVAL_FOR_ALL_ALERT_ID: &str = "ICE-PHISHING-APPROVAL-FOR-ALL";
pub const PREV_APPROVED_TRANSFERRED_ALERT_ID: &str = "ICE-PHISHING-PREV-APPROVED-TRANSFERRED";

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What kind of evidence the alert carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCategory {
    /// Risky permissioning, no assets moved yet
    Suspicious,
    /// Assets covered by an approval were moved by the spender
    Exploit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMetadata {
    pub spender: Address,
    pub first_tx_hash: H256,
    pub last_tx_hash: H256,
    /// Distinct assets in the window, first-seen order
    pub assets_impacted: Vec<Address>,
    /// Distinct owners in the window, first-seen order
    pub owners: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: AlertCategory,
    pub metadata: AlertMetadata,
}

impl Alert {
    /// Spender accumulated more approvals than the threshold inside the window
    pub fn high_num_approvals(spender: Address, summary: &WindowSummary, window_days: u64) -> Self {
        Self {
            alert_id: HIGH_NUM_APPROVALS_ALERT_ID.to_string(),
            title: "High number of accounts granted approvals for digital assets".to_string(),
            description: format!(
                "{:?} obtained transfer approval for {} assets by {} accounts \
                 over period of {} days.",
                spender,
                summary.assets.len(),
                summary.owners.len(),
                window_days
            ),
            severity: Severity::Low,
            category: AlertCategory::Suspicious,
            metadata: AlertMetadata::from_summary(spender, summary),
        }
    }

    /// A single blanket approval, raised on every qualifying event
    pub fn approval_for_all(record: &ApprovalRecord) -> Self {
        Self {
            alert_id: APPROVAL_FOR_ALL_ALERT_ID.to_string(),
            title: "Account got approval for all tokens".to_string(),
            description: format!(
                "{:?} obtained transfer approval for all tokens of {:?} from {:?}",
                record.spender, record.asset, record.owner
            ),
            severity: Severity::Low,
            category: AlertCategory::Suspicious,
            metadata: AlertMetadata {
                spender: record.spender,
                first_tx_hash: record.tx_hash,
                last_tx_hash: record.tx_hash,
                assets_impacted: vec![record.asset],
                owners: vec![record.owner],
            },
        }
    }

    /// Spender moved assets it was previously approved for
    pub fn previously_approved_transfer(
        spender: Address,
        summary: &WindowSummary,
        window_days: u64,
    ) -> Self {
        Self {
            alert_id: PREV_APPROVED_TRANSFERRED_ALERT_ID.to_string(),
            title: "Previously approved assets transferred".to_string(),
            description: format!(
                "{:?} transferred {} assets from {} accounts over period of {} days.",
                spender,
                summary.assets.len(),
                summary.owners.len(),
                window_days
            ),
            severity: Severity::High,
            category: AlertCategory::Exploit,
            metadata: AlertMetadata::from_summary(spender, summary),
        }
    }
}

impl AlertMetadata {
    fn from_summary(spender: Address, summary: &WindowSummary) -> Self {
        Self {
            spender,
            first_tx_hash: summary.first_tx_hash,
            last_tx_hash: summary.last_tx_hash,
            assets_impacted: summary.assets.clone(),
            owners: summary.owners.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_high_num_approvals_text() {
        let summary = WindowSummary {
            count: 3,
            first_tx_hash: H256::repeat_byte(1),
            last_tx_hash: H256::repeat_byte(3),
            assets: vec![Address::repeat_byte(0xa), Address::repeat_byte(0xb)],
            owners: vec![Address::repeat_byte(0xc)],
        };
        let spender = Address::repeat_byte(0xee);
        let alert = Alert::high_num_approvals(spender, &summary, 30);

        assert_eq!(alert.alert_id, HIGH_NUM_APPROVALS_ALERT_ID);
        assert!(alert.description.contains("2 assets by 1 accounts over period of 30 days"));
        assert_eq!(alert.metadata.first_tx_hash, H256::repeat_byte(1));
        assert_eq!(alert.metadata.last_tx_hash, H256::repeat_byte(3));
        assert_eq!(alert.category, AlertCategory::Suspicious);
    }
}
