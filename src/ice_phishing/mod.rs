//! Ice-phishing detection module
//!
//! Correlates token approvals with later transfers to spot spenders that
//! collect permissions from many owners and then drain them.
//!
//! ## Architecture
//! - `classifier`: LRU-cached address classification (EOA / contract, nonce, verification)
//! - `tracker`: per-spender approval and transfer windows
//! - `detector`: the correlation engine driving everything per transaction and block
//! - `sweeper`: block-driven retention
//! - `bus`: alert publish/subscribe

pub mod alerts;
pub mod bus;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod errors;
pub mod events;
pub mod sweeper;
pub mod tracker;

pub use alerts::{Alert, AlertCategory, AlertMetadata, Severity};
pub use bus::{AlertBus, AlertSubscriber, LoggingSubscriber, StatisticsSubscriber};
pub use classifier::{AddressClassifier, AddressRecord, Classification, Role};
pub use config::{DetectorConfig, MonitorConfig};
pub use detector::CorrelationEngine;
pub use errors::{DetectorError, Result};
pub use events::{ApprovalEvent, BlockEvent, TransactionEvent, TransferEvent};
pub use sweeper::{RetentionSweeper, SweepReport};
pub use tracker::{
    ApprovalRecord, ApprovalTracker, SpenderBucket, SpenderStore, TransferCorrelator,
    TransferRecord,
};
