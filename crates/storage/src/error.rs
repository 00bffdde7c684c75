//! Storage error types and result alias.
//!
//! All storage backends map their internal errors to these standardized
//! variants so that consumers handle one taxonomy regardless of backend.

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Errors preserve their source chain via the `#[source]` attribute,
/// enabling debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added
/// in future minor releases without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested key was not found in the storage backend.
    #[error("Key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A conditional write failed because the key already holds a value.
    ///
    /// Returned by [`insert_with_ttl`](crate::KeyValueStore::insert_with_ttl)
    /// when the key is present and unexpired. Callers relying on
    /// insert-if-absent semantics (e.g., token collision safety) should
    /// treat this as "the slot was taken" rather than a fault.
    #[error("Write conflict")]
    Conflict,

    /// Serialization or deserialization error.
    ///
    /// Occurs when data cannot be encoded for storage or decoded when
    /// retrieved. This typically indicates data corruption or schema
    /// incompatibility.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("grant/abc").to_string(), "Key not found: grant/abc");
        assert_eq!(StorageError::conflict().to_string(), "Write conflict");
        assert_eq!(StorageError::Timeout.to_string(), "Operation timeout");
    }

    #[test]
    fn test_source_chain_preserved() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = StorageError::internal_with_source("flush failed", inner);

        assert_eq!(err.to_string(), "Internal error: flush failed");
        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "disk gone");
    }

    #[test]
    fn test_serialization_without_source() {
        let err = StorageError::serialization("bad json");
        assert_eq!(err.to_string(), "Serialization error: bad json");
        assert!(err.source().is_none());
    }
}
