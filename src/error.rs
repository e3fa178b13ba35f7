//! Error types for the tracker.

use crate::types::DocumentId;
use thiserror::Error;

/// Reason a customer name was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name is required")]
    NameRequired,

    #[error("Name must be at least 2 characters long")]
    NameTooShort,

    #[error("Name must be less than 50 characters")]
    NameTooLong,

    #[error("Name can only contain letters and spaces")]
    NameInvalidCharacters,
}

/// Main error type for tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: DocumentId },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Subscription dropped")]
    SubscriptionDropped,

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl TrackerError {
    /// Whether the failure came from talking to the store rather than from
    /// the caller's input. These surface as a generic "try again" to users.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::Io(_)
                | TrackerError::Serialization(_)
                | TrackerError::Deserialization(_)
                | TrackerError::Corruption(_)
                | TrackerError::ChecksumMismatch { .. }
                | TrackerError::InvalidFormat(_)
                | TrackerError::Locked
                | TrackerError::NotInitialized
                | TrackerError::SubscriptionDropped
                | TrackerError::SubscriptionFailed(_)
        )
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for TrackerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        TrackerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for TrackerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        TrackerError::Deserialization(e.to_string())
    }
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;
