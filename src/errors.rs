//! Structured error types for the memory store
//!
//! Every failure surfaced to callers carries a machine-readable code and a
//! human-readable message, so embedding applications can branch on the code
//! without string matching.

use std::fmt;

/// Store error types with proper categorization
#[derive(Debug)]
pub enum MemoryError {
    /// Rejected argument: empty embedding, zero top_k, negative age,
    /// inverted time range. Surfaced synchronously, never retried.
    InvalidInput { field: String, reason: String },

    /// A persistence path resolved outside the configured base directory
    /// and the system temp directory. Raised before any filesystem access.
    PathTraversal(String),

    /// A bounded operation exceeded its wall-clock deadline. The underlying
    /// scan is abandoned, not retried; the caller sees no partial result.
    Timeout { operation: String, seconds: f64 },

    /// Snapshot bytes failed to decode. `load` recovers from this locally
    /// by clearing in-memory state and replaying the write-ahead log.
    Corruption(String),

    /// Filesystem failure (open, append, fsync, rename)
    Storage(String),

    /// Wire-format encode/decode failure outside the corruption path
    Serialization(String),

    /// Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl MemoryError {
    /// Build an `InvalidInput` error for a named argument
    pub fn invalid_input(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::PathTraversal(_) => "PATH_TRAVERSAL",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Corruption(_) => "CORRUPTION",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::PathTraversal(path) => format!("Path traversal detected: {path}"),
            Self::Timeout { operation, seconds } => {
                format!("Operation '{operation}' exceeded deadline of {seconds}s")
            }
            Self::Corruption(msg) => format!("Corrupt snapshot data: {msg}"),
            Self::Storage(msg) => format!("Storage error: {msg}"),
            Self::Serialization(msg) => format!("Serialization error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for MemoryError {}

/// Convert from anyhow::Error to MemoryError
impl From<anyhow::Error> for MemoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Type alias for Results using MemoryError
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MemoryError::invalid_input("embedding", "cannot be empty").code(),
            "INVALID_INPUT"
        );
        assert_eq!(
            MemoryError::PathTraversal("/etc/passwd".to_string()).code(),
            "PATH_TRAVERSAL"
        );
        assert_eq!(
            MemoryError::Timeout {
                operation: "retrieve".to_string(),
                seconds: 5.0
            }
            .code(),
            "TIMEOUT"
        );
        assert_eq!(
            MemoryError::Corruption("truncated".to_string()).code(),
            "CORRUPTION"
        );
    }

    #[test]
    fn test_messages_include_context() {
        let err = MemoryError::invalid_input("top_k", "must be positive");
        assert!(err.message().contains("top_k"));
        assert!(err.message().contains("must be positive"));

        let err = MemoryError::Timeout {
            operation: "prune".to_string(),
            seconds: 60.0,
        };
        assert!(err.to_string().contains("prune"));
        assert!(err.to_string().contains("60"));
    }
}
