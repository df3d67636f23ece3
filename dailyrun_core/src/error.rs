//! Error types for the daily run engine.

use dailyrun_env::EnvError;
use thiserror::Error;

/// Errors surfaced by every engine operation.
///
/// Lifecycle no-ops ("already deleted", "not deleted") are not errors; they
/// come back as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// The store is unreachable, a query failed, or a stored value could not
    /// be decoded. Never retried by the engine.
    #[error("Storage error: {0}")]
    StorageError(String),
    
    /// A record or seed that must exist is absent
    #[error("Not found: {0}")]
    NotFound(String),
    
    /// Rejected input (negative score/wave, malformed day, unknown category)
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Convenience alias used across the engine.
pub type RunResult<T> = Result<T, RunError>;

impl RunError {
    /// Creates a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }
    
    /// Creates a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    
    /// Creates a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

impl From<sled::Error> for RunError {
    fn from(e: sled::Error) -> Self {
        Self::StorageError(format!("sled: {}", e))
    }
}

impl From<serde_json::Error> for RunError {
    fn from(e: serde_json::Error) -> Self {
        Self::StorageError(format!("Corrupt record: {}", e))
    }
}

impl From<EnvError> for RunError {
    fn from(e: EnvError) -> Self {
        Self::ValidationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_env_errors_become_validation_errors() {
        let err: RunError = EnvError::invalid_day("2024-13-01").into();
        assert_eq!(err, RunError::ValidationError("Invalid day: 2024-13-01".to_string()));
    }
    
    #[test]
    fn test_decode_errors_become_storage_errors() {
        let decode = serde_json::from_slice::<u32>(b"{").unwrap_err();
        let err: RunError = decode.into();
        assert!(matches!(err, RunError::StorageError(_)));
    }
}
