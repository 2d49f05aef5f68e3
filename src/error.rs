//! Error handling module for rados-deploy
//!
//! Provides centralized error handling with proper error types using thiserror.
//! All errors in the library should use these types for consistency.

use thiserror::Error;

/// Main error type for rados-deploy
#[derive(Error, Debug)]
pub enum DeployError {
    /// IO errors (file operations, local process spawning, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (empty reservation, mixed users, bad flag values)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Topology validation errors (under-provisioned roles)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A lookup for a node that does not exist in the reservation
    #[error("Not found: {0}")]
    NotFound(String),

    /// Could not establish an SSH session to a node
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A remote command failed on one or more nodes
    #[error("Remote action failed: {0}")]
    RemoteAction(String),

    /// JSON serialization/deserialization errors (reservation documents)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for rados-deploy operations
pub type Result<T> = std::result::Result<T, DeployError>;

// Convenient error constructors
impl DeployError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a remote-action error
    pub fn remote_action(msg: impl Into<String>) -> Self {
        Self::RemoteAction(msg.into())
    }

    /// Whether this error is a precondition failure, surfaced before any
    /// remote action ran.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Validation(_) | Self::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeployError::configuration("reservation is empty");
        assert_eq!(err.to_string(), "Configuration error: reservation is empty");

        let err = DeployError::validation("need 3 monitors, found 2");
        assert_eq!(err.to_string(), "Validation error: need 3 monitors, found 2");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DeployError = io_err.into();
        assert!(matches!(err, DeployError::Io(_)));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(DeployError::configuration("x").is_precondition());
        assert!(DeployError::validation("x").is_precondition());
        assert!(DeployError::not_found("x").is_precondition());
        assert!(!DeployError::connectivity("x").is_precondition());
        assert!(!DeployError::remote_action("x").is_precondition());
    }
}
