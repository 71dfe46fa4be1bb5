//! Error types for scriva.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using scriva's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for scriva operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found (attachment, parent record, or stored object).
    /// Non-retryable; aborts the specific operation only.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attachment not found
    #[error("Attachment not found: {0}")]
    AttachmentNotFound(Uuid),

    /// Parent record not found
    #[error("Parent record not found: {0}")]
    ParentNotFound(Uuid),

    /// Transcription failed (fetch, backend call, or decode).
    /// Always treated as retryable up to the retry budget.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Blob storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Event dispatch failed (broker disconnected or disabled).
    /// Logged and swallowed at the aggregator boundary; never retried.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// Invalid or incomplete configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the target no longer exists.
    ///
    /// Deferred retry tasks use this to abort quietly when an attachment
    /// or parent was deleted after the timer was armed.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::AttachmentNotFound(_) | Error::ParentNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("blob ref".to_string());
        assert_eq!(err.to_string(), "Not found: blob ref");
    }

    #[test]
    fn test_error_display_attachment_not_found() {
        let id = Uuid::nil();
        let err = Error::AttachmentNotFound(id);
        assert_eq!(err.to_string(), format!("Attachment not found: {}", id));
    }

    #[test]
    fn test_error_display_parent_not_found() {
        let id = Uuid::new_v4();
        let err = Error::ParentNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_transcription() {
        let err = Error::Transcription("backend returned 503".to_string());
        assert_eq!(err.to_string(), "Transcription error: backend returned 503");
    }

    #[test]
    fn test_error_display_dispatch() {
        let err = Error::Dispatch("producer not connected".to_string());
        assert_eq!(err.to_string(), "Dispatch error: producer not connected");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("SASL username missing".to_string());
        assert_eq!(err.to_string(), "Configuration error: SASL username missing");
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(Error::AttachmentNotFound(Uuid::nil()).is_not_found());
        assert!(Error::ParentNotFound(Uuid::nil()).is_not_found());
        assert!(!Error::Transcription("x".into()).is_not_found());
        assert!(!Error::Dispatch("x".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
