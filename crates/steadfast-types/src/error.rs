use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry classification carried by every error the engine inspects.
///
/// The retry handler checks this discriminant directly instead of matching
/// on concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient failure (network, timeout, element not rendered yet).
    Retryable,
    /// Validation or configuration failure; retrying cannot help.
    NonRetryable,
    /// The environment itself is broken; abort every pending retry.
    StateInvalid,
}

impl ErrorKind {
    /// Whether an error of this kind may be retried.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

/// Errors that know their own retry classification.
pub trait RetryClassify {
    /// The retry classification of this error.
    fn error_kind(&self) -> ErrorKind;
}

impl RetryClassify for std::io::Error {
    fn error_kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match self.kind() {
            Io::TimedOut
            | Io::Interrupted
            | Io::WouldBlock
            | Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::BrokenPipe => ErrorKind::Retryable,
            _ => ErrorKind::NonRetryable,
        }
    }
}

/// Errors reported by the automation driver port.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("timed out after {timeout_ms}ms waiting for '{target}'")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("automation session disconnected")]
    Disconnected,
}

impl RetryClassify for DriverError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            DriverError::Timeout { .. }
            | DriverError::NotFound(_)
            | DriverError::Network(_)
            | DriverError::ActionFailed(_) => ErrorKind::Retryable,
            DriverError::InvalidSelector(_) => ErrorKind::NonRetryable,
            DriverError::Disconnected => ErrorKind::StateInvalid,
        }
    }
}

/// Errors from checkpoint and run-state stores (used by port traits in steadfast-core).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("malformed record at {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid workflow id: {0:?}")]
    InvalidKey(String),
}

/// Errors from the fallback-chain locator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("no selector chain registered under '{0}'")]
    UnknownChain(String),

    #[error("selector chain '{0}' has no selectors")]
    EmptyChain(String),
}

/// Errors from `WorkflowExecutor::resume`, generic over the workflow's own error.
#[derive(Debug, Error)]
pub enum ResumeError<E> {
    #[error("no run state at {}", .0.display())]
    NotFound(std::path::PathBuf),

    #[error("workflow {0} already completed")]
    AlreadyCompleted(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Workflow(E),
}

/// Errors from configuration validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid [{section}] setting '{field}': {reason}")]
    Invalid {
        section: &'static str,
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_classification() {
        let timeout = DriverError::Timeout {
            target: "#submit".to_string(),
            timeout_ms: 500,
        };
        assert_eq!(timeout.error_kind(), ErrorKind::Retryable);
        assert_eq!(
            DriverError::NotFound("#x".to_string()).error_kind(),
            ErrorKind::Retryable
        );
        assert_eq!(
            DriverError::InvalidSelector("[[".to_string()).error_kind(),
            ErrorKind::NonRetryable
        );
        assert_eq!(DriverError::Disconnected.error_kind(), ErrorKind::StateInvalid);
    }

    #[test]
    fn test_io_error_classification() {
        let transient = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(transient.error_kind(), ErrorKind::Retryable);

        let permanent = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(permanent.error_kind(), ErrorKind::NonRetryable);
    }

    #[test]
    fn test_error_display() {
        let err = DriverError::Timeout {
            target: "#claim".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "timed out after 250ms waiting for '#claim'");

        let err = LocatorError::UnknownChain("login".to_string());
        assert!(err.to_string().contains("login"));

        let err: ResumeError<DriverError> = ResumeError::AlreadyCompleted("wf-1".to_string());
        assert_eq!(err.to_string(), "workflow wf-1 already completed");
        let err: ResumeError<DriverError> = ResumeError::Workflow(DriverError::Disconnected);
        assert_eq!(err.to_string(), "automation session disconnected");
    }

    #[test]
    fn test_error_kind_serde() {
        let json = serde_json::to_string(&ErrorKind::StateInvalid).unwrap();
        assert_eq!(json, "\"state_invalid\"");
        assert!(ErrorKind::Retryable.is_retryable());
        assert!(!ErrorKind::NonRetryable.is_retryable());
    }
}
