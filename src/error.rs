//! Error types for the Volume Claim Operator
//!
//! Two failure kinds matter to the reconciler: backend errors (the volume
//! service refused or failed a create/delete) and cluster errors (the
//! Kubernetes API refused or failed a PersistentVolume call). A failed
//! rollback is reported as its own variant so operators can tell
//! "provisioning failed" apart from "provisioning failed and cleanup failed".

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Cluster {method} {path} failed{}: {reason}", status_suffix(.status))]
    Cluster {
        method: String,
        path: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Invalid claim {name}: {reason}")]
    InvalidClaim { name: String, reason: String },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend operation failed: {operation} {volume}: {reason}")]
    Backend {
        operation: String,
        volume: String,
        reason: String,
    },

    #[error("Rollback of volume {volume} failed ({rollback}) after: {original}")]
    RollbackFailed {
        volume: String,
        original: Box<Error>,
        rollback: Box<Error>,
    },

    // =========================================================================
    // Transport / Parse Errors
    // =========================================================================
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Build a backend error
    pub fn backend(
        operation: impl Into<String>,
        volume: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Backend {
            operation: operation.into(),
            volume: volume.into(),
            reason: reason.into(),
        }
    }

    /// Build a cluster error
    pub fn cluster(
        method: impl Into<String>,
        path: impl Into<String>,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Cluster {
            method: method.into(),
            path: path.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Throttled by the API server
            Error::Cluster {
                status: Some(429), ..
            } => ErrorAction::RequeueAfter(Duration::from_secs(10)),

            // Request timeout is transient, other client errors won't fix themselves
            Error::Cluster {
                status: Some(408), ..
            } => ErrorAction::RequeueWithBackoff,
            Error::Cluster {
                status: Some(s), ..
            } if (400..500).contains(s) => ErrorAction::NoRequeue,

            // Backend state is unknown after a failed rollback
            Error::RollbackFailed { .. } => ErrorAction::NoRequeue,

            Error::Configuration(_)
            | Error::InvalidClaim { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Whether this error came from the volume backend
    pub fn is_backend(&self) -> bool {
        matches!(self, Error::Backend { .. })
    }

    /// Whether this error came from the cluster API
    pub fn is_cluster(&self) -> bool {
        matches!(self, Error::Cluster { .. })
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_error_actions() {
        let err = Error::backend("create", "c1", "connection refused");
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);

        let err = Error::cluster("POST", "/api/v1/persistentvolumes", Some(409), "exists");
        assert_eq!(err.action(), ErrorAction::NoRequeue);

        let err = Error::cluster("POST", "/api/v1/persistentvolumes", Some(429), "slow down");
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(10))
        );

        let err = Error::cluster("GET", "/api/v1/persistentvolumes/c1", Some(503), "unavailable");
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);

        let err = Error::Configuration("bad config".into());
        assert_eq!(err.action(), ErrorAction::NoRequeue);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::backend("delete", "c1", "timeout");
        assert!(transient.is_retryable());

        let unreachable = Error::cluster("POST", "/api/v1/persistentvolumes", None, "refused");
        assert!(unreachable.is_retryable());

        let timeout = Error::cluster("GET", "/api/v1/persistentvolumes/c1", Some(408), "timeout");
        assert!(timeout.is_retryable());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_retryable());
    }

    #[test]
    fn test_rollback_failed_keeps_both_errors() {
        let err = Error::RollbackFailed {
            volume: "c1".into(),
            original: Box::new(Error::cluster(
                "POST",
                "/api/v1/persistentvolumes",
                Some(500),
                "boom",
            )),
            rollback: Box::new(Error::backend("delete", "c1", "gone away")),
        };

        assert!(!err.is_retryable());
        assert_matches!(
            err,
            Error::RollbackFailed { ref original, ref rollback, .. }
                if original.is_cluster() && rollback.is_backend()
        );

        let message = err.to_string();
        assert!(message.contains("boom"));
        assert!(message.contains("gone away"));
    }

    #[test]
    fn test_cluster_error_display() {
        let err = Error::cluster("DELETE", "/api/v1/persistentvolumes/c1", Some(404), "not found");
        assert_eq!(
            err.to_string(),
            "Cluster DELETE /api/v1/persistentvolumes/c1 failed (404): not found"
        );

        let err = Error::cluster("GET", "/api/v1/persistentvolumes/c1", None, "refused");
        assert_eq!(
            err.to_string(),
            "Cluster GET /api/v1/persistentvolumes/c1 failed: refused"
        );
    }
}
