//! Error types for the Keycloak Kubernetes Operator

use std::time::Duration;
use thiserror::Error;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeApi(String),

    /// Object does not exist on the cluster
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource kind itself is not served by the cluster (CRD not installed)
    #[error("Resource kind not registered: {0}")]
    KindNotRegistered(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reconciliation error
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(String),

    /// The admin API answered with a status the operation does not accept
    #[error("failed to {verb} {kind}: ({status}) {reason}")]
    Status {
        verb: &'static str,
        kind: String,
        status: u16,
        reason: String,
    },

    /// Token request was rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid resource state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl OperatorError {
    /// The object is missing on the cluster.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::NotFound(_))
    }

    /// The object's kind is not installed on the cluster.
    pub fn is_kind_not_registered(&self) -> bool {
        matches!(self, OperatorError::KindNotRegistered(_))
    }

    /// Either flavour of "nothing to read here".
    pub fn is_absent(&self) -> bool {
        self.is_not_found() || self.is_kind_not_registered()
    }

    /// Check if this error is worth retrying on the next pass
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperatorError::KubeApi(_)
                | OperatorError::Http(_)
                | OperatorError::Status { .. }
                | OperatorError::Reconciliation(_)
        )
    }

    /// Suggested requeue delay for the controllers
    pub fn requeue_delay(&self) -> Duration {
        if self.is_retryable() {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(120)
        }
    }
}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        OperatorError::KubeApi(err.to_string())
    }
}

impl From<reqwest::Error> for OperatorError {
    fn from(err: reqwest::Error) -> Self {
        OperatorError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Serialization(err.to_string())
    }
}
