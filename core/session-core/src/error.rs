//! Error types for session-core operations.
//! Keep DataError small and cloneable; it is what the presentation layer sees.

use std::fmt;
use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Presentation Error (cloneable, published in snapshots)
// ═══════════════════════════════════════════════════════════════════════════════

/// Which failure class ended a profile fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataErrorKind {
    /// The fetch exceeded its budget on every attempt.
    Timeout,
    /// The backend reported a failure.
    Remote,
}

/// Error surfaced to the presentation layer after retries are exhausted.
///
/// Unlike [`SyncError`] this is `Clone`, so it can live inside published snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataError {
    pub kind: DataErrorKind,
    pub message: String,
}

impl DataError {
    pub fn timeout(label: &str) -> Self {
        DataError {
            kind: DataErrorKind::Timeout,
            message: format!("{} timed out", label),
        }
    }

    pub fn remote(err: &SyncError) -> Self {
        DataError {
            kind: DataErrorKind::Remote,
            message: err.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == DataErrorKind::Timeout
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in session-core operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ─────────────────────────────────────────────────────────────────────
    // Remote Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Remote {operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    // ─────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Store error: {context}: {details}")]
    Store { context: String, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },
}

impl SyncError {
    pub fn remote(operation: &'static str, message: impl Into<String>) -> Self {
        SyncError::Remote {
            operation,
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_from_remote_keeps_message() {
        let err = SyncError::remote("profile fetch", "row level security");
        let data = DataError::remote(&err);
        assert_eq!(data.kind, DataErrorKind::Remote);
        assert_eq!(
            data.to_string(),
            "Remote profile fetch failed: row level security"
        );
        assert!(!data.is_timeout());
    }

    #[test]
    fn test_data_error_timeout_names_label() {
        let data = DataError::timeout("profile");
        assert!(data.is_timeout());
        assert_eq!(data.message, "profile timed out");
    }
}
