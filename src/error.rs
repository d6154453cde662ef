//! Error types for the Database Backup Operator

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No adapter registered for the database engine
    #[error("database {0} is not supported")]
    UnsupportedEngine(String),

    /// Execution unit already exists
    #[error("execution unit already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Execution unit already owned by another resource
    #[error("execution unit {0} is owned by another resource")]
    ForeignOwner(String),

    /// Execution unit not found
    #[error("execution unit not found: {0}")]
    UnitNotFound(String),

    /// Adapter answered with a failure
    #[error("Delegation error: {0}")]
    Delegation(String),

    /// Adapter transport error
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Adapter call timed out
    #[error("{0} call timed out")]
    Timeout(String),

    /// Adapter call cancelled by the caller
    #[error("{0} call cancelled")]
    Cancelled(String),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a delegation error
    pub fn delegation(msg: impl Into<String>) -> Self {
        Error::Delegation(msg.into())
    }

    /// Errors that need operator action before a retry can succeed
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Validation(_)
                | Error::UnsupportedEngine(_)
                | Error::ForeignOwner(_)
        )
    }

    /// Errors that the work queue should re-deliver
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Kube(_)
                | Error::Conflict(_)
                | Error::Transport(_)
                | Error::Timeout(_)
                | Error::Cancelled(_)
                | Error::Delegation(_)
        )
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_engine_is_configuration_error() {
        let err = Error::UnsupportedEngine("unknown".to_string());
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "database unknown is not supported");
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert!(Error::Timeout("Backup".to_string()).is_retryable());
        assert!(Error::Cancelled("Restore".to_string()).is_retryable());
        assert!(Error::Conflict("cronjob".to_string()).is_retryable());
        assert!(!Error::validation("bad").is_retryable());
    }

    #[test]
    fn foreign_owner_waits_for_change() {
        let err = Error::ForeignOwner("backups/backup-pg-db1".to_string());
        assert!(err.is_configuration());
        assert!(!err.is_retryable());
    }
}
