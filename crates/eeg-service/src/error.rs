//! Service-level errors and their wire representation

use eeg_core::EegError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure of one service request or of service startup
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Request body did not name a recording
    BadRequest(String),
    /// Object store lookup or copy failed
    Storage { key: String, message: String },
    /// Pipeline and classifier did not finish in time
    Timeout { secs: u64 },
    /// Service configuration is invalid
    Configuration(String),
    /// Worker task panicked or was cancelled
    Internal(String),
    /// Pipeline or classifier failure
    Core(EegError),
}

impl ServiceError {
    pub fn storage(key: impl Into<String>, message: impl fmt::Display) -> Self {
        ServiceError::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Stable identifier for the `kind` field of error responses
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Storage { .. } => "storage",
            ServiceError::Timeout { .. } => "timeout",
            ServiceError::Configuration(_) => "configuration",
            ServiceError::Internal(_) => "internal",
            ServiceError::Core(e) => e.kind().as_str(),
        }
    }

    /// HTTP-style status a gateway would answer with
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Timeout { .. } => 504,
            _ => 500,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::BadRequest(message) => write!(f, "{}", message),
            ServiceError::Storage { key, message } => {
                write!(f, "Storage error for '{}': {}", key, message)
            }
            ServiceError::Timeout { secs } => write!(f, "Request exceeded {}s timeout", secs),
            ServiceError::Configuration(message) => write!(f, "Configuration error: {}", message),
            ServiceError::Internal(message) => write!(f, "Internal error: {}", message),
            ServiceError::Core(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EegError> for ServiceError {
    fn from(err: EegError) -> Self {
        ServiceError::Core(err)
    }
}

/// Body of a failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            kind: err.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eeg_core::LoadFailure;

    #[test]
    fn test_distinct_kinds() {
        let errors = vec![
            ServiceError::BadRequest("missing key".into()),
            ServiceError::storage("a.set", "not found"),
            ServiceError::Timeout { secs: 30 },
            ServiceError::Configuration("BUCKET_NAME not configured".into()),
            EegError::load("a.set", LoadFailure::ChannelCount { expected: 19, actual: 18 }).into(),
            EegError::TooShort { samples: 10, window_samples: 512, sampling_rate: 256.0 }.into(),
            EegError::spectral("no bins").into(),
            EegError::inference("empty output").into(),
        ];

        let kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["bad_request", "storage", "timeout", "configuration", "load", "too_short",
                 "spectral_estimation", "inference"]
        );
    }

    #[test]
    fn test_error_response() {
        let err = ServiceError::Timeout { secs: 5 };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.kind, "timeout");
        assert!(response.error.contains("5s"));
        assert_eq!(err.status(), 504);
        assert_eq!(ServiceError::BadRequest(String::new()).status(), 400);
    }
}
