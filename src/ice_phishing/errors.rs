//! Error types for the correlation engine
//!
//! One error enum for the whole detector; collaborator failures are kept
//! distinct from configuration problems so the caller can decide whether to
//! drop an event or refuse to start.

use thiserror::Error;

/// Detector error type
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external collaborator (RPC node, verification API) failed
    #[error("Collaborator error: {collaborator} - {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// A collaborator call exceeded the lookup timeout
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// A raw log or event is missing expected fields
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detector result type
pub type Result<T> = std::result::Result<T, DetectorError>;

impl DetectorError {
    /// Shorthand for a collaborator failure
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    /// Errors that only cost the current event; processing continues
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Collaborator { .. } | Self::Timeout { .. } | Self::MalformedEvent(_)
        )
    }

    /// Errors that must stop the process (bad config, broken IO)
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Io(_))
    }
}

impl From<serde_json::Error> for DetectorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for DetectorError {
    fn from(e: toml::de::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DetectorError::collaborator("rpc", "connection refused");
        assert_eq!(err.to_string(), "Collaborator error: rpc - connection refused");

        let err = DetectorError::Timeout {
            operation: "eth_getCode",
            timeout_ms: 500,
        };
        assert!(err.to_string().contains("500ms"));
    }

    #[test]
    fn test_error_classes() {
        let recoverable = DetectorError::MalformedEvent("missing topic".to_string());
        assert!(recoverable.is_recoverable());
        assert!(!recoverable.is_critical());

        let critical = DetectorError::Configuration("retention window is zero".to_string());
        assert!(critical.is_critical());
        assert!(!critical.is_recoverable());
    }

    #[test]
    fn test_from_serde_error() {
        let err: DetectorError = serde_json::from_str::<u64>("not json").unwrap_err().into();
        assert!(matches!(err, DetectorError::Serialization(_)));
    }
}
