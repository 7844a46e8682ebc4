//! Error types for the sales relay

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Upstream could not be reached when a stream was requested
    #[error("Upstream channel unavailable ({target}): {reason}")]
    ChannelUnavailable { target: String, reason: String },

    /// Mid-stream failure reported by the upstream call
    #[error("Upstream stream error: {0}")]
    Stream(#[from] tonic::Status),

    /// Writing to a downstream session failed
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Failures that only affect one session and may clear up on their own
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::ChannelUnavailable { .. } | RelayError::Delivery(_)
        )
    }

    /// Whether the process cannot start with this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let unavailable = RelayError::ChannelUnavailable {
            target: "localhost:9090".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(unavailable.is_transient());
        assert!(!unavailable.is_fatal());

        let config = RelayError::Config("port must be non-zero".to_string());
        assert!(config.is_fatal());
        assert!(!config.is_transient());

        let stream = RelayError::from(tonic::Status::unavailable("gone"));
        assert!(!stream.is_transient());
    }

    #[test]
    fn test_channel_unavailable_message() {
        let err = RelayError::ChannelUnavailable {
            target: "sales:9090".to_string(),
            reason: "timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Upstream channel unavailable (sales:9090): timed out"
        );
    }
}
