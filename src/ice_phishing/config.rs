//! Detector configuration
//!
//! Thresholds and retention settings for the correlation engine. Loaded from
//! JSON or TOML, optionally overridden from `ICE_PHISHING_*` environment
//! variables, and validated before the engine is allowed to start.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ice_phishing::errors::{DetectorError, Result};

const ENV_PREFIX: &str = "ICE_PHISHING_";
const SECONDS_PER_DAY: u64 = 86_400;

/// Correlation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Approvals per spender (inside the window) that must be exceeded before alerting
    #[serde(default = "DetectorConfig::default_approve_count_threshold")]
    pub approve_count_threshold: usize,

    /// Correlated transfers per spender that must be exceeded before alerting
    #[serde(default = "DetectorConfig::default_transfer_count_threshold")]
    pub transfer_count_threshold: usize,

    /// Sliding retention window (seconds)
    #[serde(default = "DetectorConfig::default_retention_window_seconds")]
    pub retention_window_seconds: u64,

    /// Approval count above which a spender is muted until the next sweep
    #[serde(default = "DetectorConfig::default_max_address_alerts_per_period")]
    pub max_address_alerts_per_period: usize,

    /// EOAs with more transactions than this are treated as exchange-like
    #[serde(default = "DetectorConfig::default_nonce_threshold")]
    pub nonce_threshold: u64,

    /// Maximum number of cached address classifications
    #[serde(default = "DetectorConfig::default_cache_capacity")]
    pub cache_capacity: usize,

    /// Upper bound for a single collaborator call (milliseconds)
    #[serde(default = "DetectorConfig::default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Skip transfer correlation for transactions without approval events
    #[serde(default = "DetectorConfig::default_require_approval_in_transaction")]
    pub require_approval_in_transaction: bool,
}

impl DetectorConfig {
    fn default_approve_count_threshold() -> usize { 2 }
    fn default_transfer_count_threshold() -> usize { 1 }
    fn default_retention_window_seconds() -> u64 { 30 * SECONDS_PER_DAY }
    fn default_max_address_alerts_per_period() -> usize { 3 }
    fn default_nonce_threshold() -> u64 { 100 }
    fn default_cache_capacity() -> usize { 100_000 }
    fn default_lookup_timeout_ms() -> u64 { 5_000 }
    fn default_require_approval_in_transaction() -> bool { true }

    /// Load configuration from a `.toml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            other => {
                return Err(DetectorError::Configuration(format!(
                    "Unsupported config format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override fields from `ICE_PHISHING_<FIELD>` environment variables.
    ///
    /// A variable that is set but unparsable is a configuration error, not a
    /// silent fallback to the default.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        fn read<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
            let key = format!("{}{}", ENV_PREFIX, name);
            match std::env::var(&key) {
                Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                    DetectorError::Configuration(format!("{} has invalid value '{}'", key, raw))
                }),
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = read("APPROVE_COUNT_THRESHOLD")? {
            self.approve_count_threshold = v;
        }
        if let Some(v) = read("TRANSFER_COUNT_THRESHOLD")? {
            self.transfer_count_threshold = v;
        }
        if let Some(v) = read("RETENTION_WINDOW_SECONDS")? {
            self.retention_window_seconds = v;
        }
        if let Some(v) = read("MAX_ADDRESS_ALERTS_PER_PERIOD")? {
            self.max_address_alerts_per_period = v;
        }
        if let Some(v) = read("NONCE_THRESHOLD")? {
            self.nonce_threshold = v;
        }
        if let Some(v) = read("CACHE_CAPACITY")? {
            self.cache_capacity = v;
        }
        if let Some(v) = read("LOOKUP_TIMEOUT_MS")? {
            self.lookup_timeout_ms = v;
        }
        if let Some(v) = read("REQUIRE_APPROVAL_IN_TRANSACTION")? {
            self.require_approval_in_transaction = v;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.retention_window_seconds == 0 {
            return Err(DetectorError::Configuration(
                "retention_window_seconds must be greater than 0".to_string(),
            ));
        }

        if self.cache_capacity == 0 {
            return Err(DetectorError::Configuration(
                "cache_capacity must be greater than 0".to_string(),
            ));
        }

        if self.lookup_timeout_ms == 0 {
            return Err(DetectorError::Configuration(
                "lookup_timeout_ms must be greater than 0".to_string(),
            ));
        }

        // A spender muted before it could cross the alert threshold would never alert.
        if self.max_address_alerts_per_period < self.approve_count_threshold {
            return Err(DetectorError::Configuration(format!(
                "max_address_alerts_per_period ({}) must not be below approve_count_threshold ({})",
                self.max_address_alerts_per_period, self.approve_count_threshold
            )));
        }

        Ok(())
    }

    /// Retention window in whole days, as reported in alert text
    pub fn retention_window_days(&self) -> u64 {
        (self.retention_window_seconds / SECONDS_PER_DAY).max(1)
    }

    pub fn lookup_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            approve_count_threshold: Self::default_approve_count_threshold(),
            transfer_count_threshold: Self::default_transfer_count_threshold(),
            retention_window_seconds: Self::default_retention_window_seconds(),
            max_address_alerts_per_period: Self::default_max_address_alerts_per_period(),
            nonce_threshold: Self::default_nonce_threshold(),
            cache_capacity: Self::default_cache_capacity(),
            lookup_timeout_ms: Self::default_lookup_timeout_ms(),
            require_approval_in_transaction: Self::default_require_approval_in_transaction(),
        }
    }
}

/// Host binary configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// JSON-RPC endpoint of the node to follow
    #[serde(default = "MonitorConfig::default_rpc_url")]
    pub rpc_url: String,

    /// Etherscan network used for source verification ("mainnet", "sepolia", ...)
    #[serde(default = "MonitorConfig::default_etherscan_network")]
    pub etherscan_network: String,

    /// Delay between polls for new blocks (milliseconds)
    #[serde(default = "MonitorConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// First block to process; defaults to the chain head at startup
    #[serde(default)]
    pub start_block: Option<u64>,

    /// Number of recent alerts kept in memory
    #[serde(default = "MonitorConfig::default_alert_buffer_size")]
    pub alert_buffer_size: usize,

    #[serde(default)]
    pub detector: DetectorConfig,
}

impl MonitorConfig {
    fn default_rpc_url() -> String { "http://localhost:8545".to_string() }
    fn default_etherscan_network() -> String { "mainnet".to_string() }
    fn default_poll_interval_ms() -> u64 { 12_000 }
    fn default_alert_buffer_size() -> usize { 1_000 }

    /// Load from a `.toml` or `.json` file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            other => {
                return Err(DetectorError::Configuration(format!(
                    "Unsupported config format {:?} for {}",
                    other,
                    path.display()
                )))
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(format!("{}RPC_URL", ENV_PREFIX)) {
            self.rpc_url = url;
        }
        self.detector.apply_env_overrides()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() {
            return Err(DetectorError::Configuration("rpc_url must not be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(DetectorError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.alert_buffer_size == 0 {
            return Err(DetectorError::Configuration(
                "alert_buffer_size must be greater than 0".to_string(),
            ));
        }
        self.detector.validate()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc_url: Self::default_rpc_url(),
            etherscan_network: Self::default_etherscan_network(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            start_block: None,
            alert_buffer_size: Self::default_alert_buffer_size(),
            detector: DetectorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retention_window_days(), 30);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DetectorConfig::default();
        config.retention_window_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.max_address_alerts_per_period = 1;
        config.approve_count_threshold = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = "approve_count_threshold = 7\nmax_address_alerts_per_period = 9\n";
        let config: DetectorConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.approve_count_threshold, 7);
        assert_eq!(config.nonce_threshold, 100);
        assert!(config.require_approval_in_transaction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_monitor_config_nested_detector() {
        let raw = r#"
            rpc_url = "http://node:8545"
            start_block = 19000000

            [detector]
            nonce_threshold = 250
        "#;
        let config: MonitorConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.start_block, Some(19_000_000));
        assert_eq!(config.detector.nonce_threshold, 250);
        assert_eq!(config.poll_interval_ms, 12_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_window_reports_one_day() {
        let config = DetectorConfig {
            retention_window_seconds: 600,
            ..DetectorConfig::default()
        };
        assert_eq!(config.retention_window_days(), 1);
    }
}
