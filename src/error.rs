//! Error types for the download core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by domain (network, resource, file, database) so the
//! download path can decide what is retryable and what must fail the item.
//!
//! ## Where errors surface
//!
//! - Enqueue-time validation (`InvalidResource`, `InvalidVariant`) is returned
//!   to the caller before any queue mutation.
//! - Part fetch failures (`NetworkError`, `UnexpectedStatusCode`, `Timeout`) are
//!   retried by the item downloader and, once the retry budget is spent, land in
//!   the item's `error` field and the `on_error` subscription.
//! - File errors during cancel/delete are logged and swallowed; during a
//!   download they fail the item.

use thiserror::Error;

/// Result type alias using our CoreError type
pub type Result<T> = std::result::Result<T, CoreError>;

/// Main error type for the download core
#[derive(Error, Debug)]
pub enum CoreError {
    // ===== Network Errors =====

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned a non-success status code for a part
    #[error("Server responded with unexpected status code {status_code} for {url}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// Part fetch exceeded its time budget
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// All attempts for a part were used up
    #[error("Part {part} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        part: u32,
        attempts: u32,
        message: String,
    },

    // ===== Resource/Input Errors =====

    /// Resource id is not part of the catalog
    #[error("Unknown resource: {0}")]
    InvalidResource(u32),

    /// Variant identifier cannot be used as a directory name
    #[error("Invalid variant: {0}")]
    InvalidVariant(String),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Queue item not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Item is in a state that does not allow the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid download URL
    #[error("Invalid download URL: {0}")]
    InvalidDownloadUrl(String),

    // ===== File/Storage Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Generic file I/O error
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== Database Errors =====

    /// Generic database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    // ===== General Errors =====

    /// Operation was cancelled by user or system
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// URL parse error
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

// Helper methods for creating common errors
impl CoreError {
    /// Create a RecordNotFound error with a resource name
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        CoreError::RecordNotFound(resource.into())
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        CoreError::InvalidInput(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        CoreError::InternalError(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        CoreError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if error is retryable (network errors, timeouts, etc.)
    ///
    /// The item downloader retries every fetch failure within its budget; this
    /// is used for logging and by callers deciding whether a manual resume is
    /// worth offering.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::NetworkError { is_transient, .. } => *is_transient,
            CoreError::Timeout(_) | CoreError::RetriesExhausted { .. } => true,
            CoreError::UnexpectedStatusCode { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || *status_code >= 500
            }
            CoreError::ReqwestError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Check if error is related to file/disk operations
    pub fn is_file_error(&self) -> bool {
        matches!(
            self,
            CoreError::FileNotFound(_) | CoreError::FileIoError(_) | CoreError::IoError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            CoreError::NetworkError { .. } | CoreError::ReqwestError(_) => {
                "Could not reach the audio server. Check your connection and try again.".to_string()
            }
            CoreError::Timeout(_) => {
                "The audio server took too long to respond. Please try again.".to_string()
            }
            CoreError::RetriesExhausted { part, .. } => {
                format!("Verse {} could not be downloaded. Tap resume to try again.", part)
            }
            CoreError::UnexpectedStatusCode { status_code: 404, .. } => {
                "This recitation is not available on the audio server.".to_string()
            }
            CoreError::FileIoError(_) | CoreError::IoError(_) => {
                "Could not save audio to device storage. Check available space.".to_string()
            }
            CoreError::InvalidResource(id) => format!("Surah {} does not exist.", id),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::network_error("reset", true).is_retryable());
        assert!(!CoreError::network_error("bad cert", false).is_retryable());
        assert!(CoreError::Timeout(30).is_retryable());
        assert!(CoreError::UnexpectedStatusCode { status_code: 503, url: "u".into() }.is_retryable());
        assert!(!CoreError::UnexpectedStatusCode { status_code: 404, url: "u".into() }.is_retryable());
        assert!(!CoreError::InvalidResource(115).is_retryable());
    }

    #[test]
    fn test_file_error_classification() {
        assert!(CoreError::FileIoError("disk full".into()).is_file_error());
        assert!(CoreError::from(std::io::Error::other("boom")).is_file_error());
        assert!(!CoreError::Cancelled.is_file_error());
    }

    #[test]
    fn test_user_message() {
        let err = CoreError::RetriesExhausted { part: 3, attempts: 3, message: "timeout".into() };
        assert!(err.user_message().contains("Verse 3"));
        assert_eq!(CoreError::InvalidResource(0).user_message(), "Surah 0 does not exist.");
        assert_eq!(CoreError::Cancelled.user_message(), "Operation cancelled");
    }
}
