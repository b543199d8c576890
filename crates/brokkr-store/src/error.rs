//! Error types for the storage layer.

use thiserror::Error;

/// Errors produced by the storage abstraction and its backend drivers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller violated the storage contract (e.g. secondary indexes on a
    /// TTL-bound record, or a missing connection URL for the selected engine).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Encrypting a record value failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decrypting a record value failed: bad key material, a tampered
    /// ciphertext, or a record carrying only one of iv/tag.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// A stored value could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The relational backend returned an error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The cache backend returned an error.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The backend could not be reached or initialized.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
