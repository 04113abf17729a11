//! Error types for the NVIDIADriver controller

use thiserror::Error;

/// Main error type for reconciliation and routing
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Required cluster configuration is missing or unusable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The state manager reported a failed sync
    #[error("sync error: {0}")]
    Sync(String),

    /// The reconcile pass was cancelled before it completed
    #[error("reconciliation cancelled")]
    Cancelled,

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a sync error with the given message
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this is an API "not found" response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}
