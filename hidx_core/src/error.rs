//! Error types for hidx_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hidx_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during indexing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A source file could not be opened or read during ingestion.
    #[error("Cannot read source file {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The scan root does not exist or cannot be traversed.
    #[error("Cannot read directory {path}: {reason}")]
    DirectoryUnreadable { path: PathBuf, reason: String },

    /// A content stream failed before it was exhausted.
    #[error("Read error: {source}")]
    ReadError { source: std::io::Error },

    /// The referenced blob is not in the blob store.
    #[error("Blob not found: {blob_ref}")]
    BlobNotFound { blob_ref: String },

    /// The metadata store cannot be reached or rejected a query.
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// No record with the given id.
    #[error("Record not found: {id}")]
    RecordNotFound { id: i64 },

    /// Invalid digest format or encoding.
    #[error("Invalid digest: {reason}")]
    InvalidDigest { reason: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Unsupported digest algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a SourceUnreadable error.
    pub fn source_unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::SourceUnreadable {
            path: path.into(),
            source,
        }
    }

    /// Create a DirectoryUnreadable error.
    pub fn directory_unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::DirectoryUnreadable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a ReadError.
    pub fn read_error(source: std::io::Error) -> Self {
        Error::ReadError { source }
    }

    /// Create a BlobNotFound error.
    pub fn blob_not_found(blob_ref: impl Into<String>) -> Self {
        Error::BlobNotFound {
            blob_ref: blob_ref.into(),
        }
    }

    /// Create a StoreUnavailable error.
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        Error::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an InvalidDigest error.
    pub fn invalid_digest(reason: impl Into<String>) -> Self {
        Error::InvalidDigest {
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Whether the failure is confined to a single file, record or blob.
    ///
    /// Batch operations log these and move on; everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SourceUnreadable { .. } | Error::ReadError { .. } | Error::BlobNotFound { .. }
        )
    }
}

// Additional From implementations for external error types

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable {
            reason: err.to_string(),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}
