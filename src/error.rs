//! REVENANT - Custom Error Types
//! Defines the error hierarchy for the key-value engine.
//!
//! Only process-fatal conditions surface as `RevenantError`: AOF I/O
//! failures, corrupt log records, broken configuration. Command-level
//! failures (bad arity, missing keys, transaction misuse) are ordinary
//! error responses, never Rust errors.

use thiserror::Error;

/// Custom Result type for the Revenant engine.
pub type Result<T> = std::result::Result<T, RevenantError>;

/// Error types for the Revenant engine.
#[derive(Error, Debug)]
pub enum RevenantError {
    /// I/O errors from file operations (AOF append, rewrite, fsync).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors on AOF records.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored log record could not be decoded during replay.
    #[error("AOF corruption detected: {0}")]
    Corruption(String),

    /// Configuration error (unreadable file, bad values).
    #[error("Configuration error: {0}")]
    Config(String),
}
