//! # Error Types Module
//!
//! Error types for the two external boundaries of the core: the meal source
//! (spreadsheet) and the storage backend.

use thiserror::Error;

/// Failure to read from or write to the external meal source
#[derive(Debug, Error)]
pub enum FetchError {
    /// The call did not complete within the configured timeout
    #[error("meal source timed out after {0}s")]
    Timeout(u64),
    /// Credentials could not be loaded or exchanged for an access token
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Transport-level failure talking to the remote API
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The remote API answered with a non-success status
    #[error("api returned {status}: {body}")]
    Api { status: u16, body: String },
    /// The response could not be interpreted
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failure of the underlying store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage call timed out after {0}s")]
    Timeout(u64),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        assert_eq!(
            FetchError::Timeout(30).to_string(),
            "meal source timed out after 30s"
        );
        assert_eq!(
            FetchError::Api {
                status: 403,
                body: "forbidden".to_string()
            }
            .to_string(),
            "api returned 403: forbidden"
        );
        assert_eq!(
            StorageError::Unavailable("lock poisoned".to_string()).to_string(),
            "storage unavailable: lock poisoned"
        );
    }
}
