//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache layer.
///
/// Only argument, pattern, configuration and registry errors are ever returned to
/// cache callers. Persistence variants are produced by the snapshot backends
/// and consumed internally.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or too long
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL cannot be represented
    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),

    /// Invalidation pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Instance or registry configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A cache with this namespace is already registered
    #[error("Namespace already registered: {0}")]
    NamespaceExists(String),

    /// No cache is registered under this name
    #[error("Unknown cache instance: {0}")]
    UnknownInstance(String),

    /// A registered cache holds a different value type than requested
    #[error("Type mismatch for namespace: {0}")]
    TypeMismatch(String),

    /// Durable medium unavailable or rejected the operation
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Snapshot encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error from a file-backed medium
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable medium did not answer in time
    #[error("Timed out: {0}")]
    Timeout(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
