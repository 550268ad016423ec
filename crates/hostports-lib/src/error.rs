//! Error types for the reconciliation pipeline.
//!
//! Errors fall into three classes with different recovery rules:
//! - runtime errors drop the connection and retry on the next tick
//! - data and deadline errors abort the current cycle only
//! - apply errors are fatal for the process

use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors from the container runtime client.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configured endpoint is not a usable address.
    #[error("Invalid runtime endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Dialing the endpoint failed.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// The runtime answered an RPC with an error status.
    #[error("Runtime request failed: {0}")]
    Status(#[from] tonic::Status),
}

/// Errors from the host rule engine.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The executor could not be started.
    #[error("Failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing the ruleset or collecting output failed.
    #[error("I/O error talking to {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The executor rejected the ruleset.
    #[error("{command} exited with {status}: {stderr}")]
    Rejected {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Errors that end a reconciliation cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A runtime query failed at the connection level.
    #[error("Runtime query failed: {0}")]
    Runtime(#[from] RuntimeError),

    /// The cycle's runtime queries did not finish within their deadline.
    #[error("Runtime queries exceeded the {0:?} cycle deadline")]
    DeadlineExceeded(Duration),

    /// A container declared ports that could not be parsed.
    #[error("Invalid container ports on {container_id}: {source}")]
    InvalidPorts {
        container_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The rule engine failed; host rule state is unknown.
    #[error("Failed to apply ruleset: {0}")]
    Apply(#[from] ApplyError),
}

impl ReconcileError {
    /// Returns true if the process must terminate
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconcileError::Apply(_))
    }

    /// Returns true if the runtime connection must be dropped
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, ReconcileError::Runtime(_))
    }
}

impl From<tonic::Status> for ReconcileError {
    fn from(status: tonic::Status) -> Self {
        ReconcileError::Runtime(RuntimeError::Status(status))
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_requires_reconnect() {
        let err = ReconcileError::from(tonic::Status::unavailable("socket closed"));
        assert!(err.requires_reconnect());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("socket closed"));
    }

    #[test]
    fn test_deadline_keeps_connection() {
        let err = ReconcileError::DeadlineExceeded(Duration::from_secs(5));
        assert!(!err.requires_reconnect());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_invalid_ports_is_cycle_local() {
        let source = serde_json::from_str::<Vec<u16>>("not json").unwrap_err();
        let err = ReconcileError::InvalidPorts {
            container_id: "abc123".to_string(),
            source,
        };
        assert!(!err.requires_reconnect());
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_apply_error_is_fatal() {
        let err = ReconcileError::from(ApplyError::Spawn {
            command: "nft -f -".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        });
        assert!(err.is_fatal());
        assert!(!err.requires_reconnect());
    }
}
