#![allow(clippy::useless_vec)]
#![allow(clippy::needless_return)]
#![allow(clippy::len_zero)]
// src/lib.rs

pub mod blockchain;

// Ice-phishing detection module
pub mod ice_phishing;

// Monitoring module
pub mod monitoring;

pub use ice_phishing::{Alert, CorrelationEngine, DetectorConfig, DetectorError};
