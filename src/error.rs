//! Error types for LeakKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LeakError
pub type Result<T> = std::result::Result<T, LeakError>;

/// Unified error type for LeakKV operations
#[derive(Debug, Error)]
pub enum LeakError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Counter Errors (surfaced to the caller, nothing applied)
    // -------------------------------------------------------------------------
    #[error("{0} cannot be used as a delta: deltas must be non-negative")]
    InvalidDelta(i64),

    #[error("cannot increment or decrement {found} value at key '{key}'")]
    NonNumericValue { key: String, found: &'static str },

    #[error("counter at key '{key}' would overflow")]
    Overflow { key: String },

    // -------------------------------------------------------------------------
    // Queue Errors
    // -------------------------------------------------------------------------
    #[error("Work queue is closed")]
    QueueClosed,

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend is closed")]
    BackendClosed,

    #[error("Log corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for LeakError {
    fn from(err: bincode::Error) -> Self {
        LeakError::Serialization(err.to_string())
    }
}
