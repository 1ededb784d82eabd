//! Error types for AtlasLock
//!
//! Provides a unified error type for all lock and store operations.
//!
//! Callers must treat every error returned from an acquire call as
//! "I do not hold the lock". No variant implies partial ownership.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using LockError
pub type Result<T> = std::result::Result<T, LockError>;

/// Unified error type for AtlasLock operations
#[derive(Debug, Error)]
pub enum LockError {
    // -------------------------------------------------------------------------
    // Acquisition Outcomes
    // -------------------------------------------------------------------------
    #[error("Lock already held: {key}")]
    AlreadyLocked { key: String },

    #[error("Timed out after {waited:?} waiting for lock: {key}")]
    AcquireTimeout { key: String, waited: Duration },

    #[error("Lock wait cancelled: {key}")]
    Cancelled { key: String },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Store operation failed: {0}")]
    StoreOperationFailed(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// True for the "someone else holds it" outcomes
    ///
    /// Lets callers pick a backoff policy without matching every variant.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            LockError::AlreadyLocked { .. } | LockError::AcquireTimeout { .. }
        )
    }
}

impl From<bincode::Error> for LockError {
    fn from(err: bincode::Error) -> Self {
        LockError::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() {
            LockError::ConnectionUnavailable(err.to_string())
        } else {
            LockError::StoreOperationFailed(err.to_string())
        }
    }
}
