//! Crate-wide error type.
//!
//! Each subsystem defines its own `thiserror` enum (see `credentials::VaultError`,
//! `uri::UriError`, `query::QueryError`, `export::ExportError`, `import::ImportError`)
//! and converts into [`CoreError`] at the public API boundary, so callers can match on
//! one type instead of threading subsystem errors through the whole call stack.

use thiserror::Error;

use crate::{
    credentials::VaultError,
    export::ExportError,
    import::ImportError,
    query::QueryError,
    uri::UriError,
};

/// The typed error conditions exposed by the core, matching spec §6's error surface.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No driver handle is registered for the given connection id.
    #[error("not connected")]
    NotConnected,
    /// A `connect` call is already in flight for this connection id.
    #[error("connection already in progress")]
    ConnectionInProgress,
    /// A database or collection name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// An extended-JSON filter/projection/sort/document failed to parse.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    /// A driver operation failed.
    #[error("query failed: {0}")]
    QueryFailed(#[source] mongodb::error::Error),
    /// An archive did not match its manifest, or was not a valid zip.
    #[error("archive corrupted: {0}")]
    ArchiveCorrupted(String),
    /// The operation was cancelled by the caller. Not a failure — an expected outcome.
    #[error("operation cancelled")]
    Cancelled,
    /// The OS keyring could not be reached; a session-scoped key was used instead.
    #[error("keyring unavailable: {0}")]
    KeyringUnavailable(String),
    /// AEAD decryption failed (wrong key, corrupted ciphertext, or bad bundle).
    #[error("decrypt failed: {0}")]
    DecryptFailed(String),
    /// Any other I/O error not covered above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Any other JSON error not covered above.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<mongodb::error::Error> for CoreError {
    fn from(e: mongodb::error::Error) -> Self {
        CoreError::QueryFailed(e)
    }
}

impl From<VaultError> for CoreError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::KeyringUnavailable(msg) => CoreError::KeyringUnavailable(msg),
            VaultError::DecryptFailed(msg) => CoreError::DecryptFailed(msg),
            VaultError::Io(e) => CoreError::Io(e),
            VaultError::Json(e) => CoreError::Json(e),
            other => CoreError::DecryptFailed(other.to_string()),
        }
    }
}

impl From<UriError> for CoreError {
    fn from(e: UriError) -> Self {
        CoreError::InvalidFilter(e.to_string())
    }
}

impl From<QueryError> for CoreError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidName(n) => CoreError::InvalidName(n),
            QueryError::InvalidFilter(f) => CoreError::InvalidFilter(f),
            QueryError::MongoDb(err) => CoreError::QueryFailed(err),
        }
    }
}

impl From<ExportError> for CoreError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::Cancelled => CoreError::Cancelled,
            ExportError::InvalidName(n) => CoreError::InvalidName(n.to_string()),
            ExportError::MongoDb(err) => CoreError::QueryFailed(err),
            ExportError::Io(err) => CoreError::Io(err),
            ExportError::Zip(msg) => CoreError::ArchiveCorrupted(msg),
        }
    }
}

impl From<ImportError> for CoreError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Cancelled => CoreError::Cancelled,
            ImportError::InvalidName(n) => CoreError::InvalidName(n.to_string()),
            ImportError::MongoDb(err) => CoreError::QueryFailed(err),
            ImportError::Io(err) => CoreError::Io(err),
            ImportError::ArchiveCorrupted(msg) => CoreError::ArchiveCorrupted(msg),
        }
    }
}

/// Convenience alias used throughout the crate's public API.
pub type CoreResult<T> = Result<T, CoreError>;
