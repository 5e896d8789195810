//! Error types for metadata feeds, tile downloads and storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a per-tile failure, as shown in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retried with backoff and still failing.
    TransientFetch,
    /// Terminal without retry (4xx, checksum/size mismatch, malformed body).
    PermanentFetch,
    /// The run was cancelled before the tile finished.
    Cancelled,
    /// Local filesystem failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::TransientFetch => "transient fetch error",
            ErrorKind::PermanentFetch => "permanent fetch error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "I/O error",
        })
    }
}

/// Errors raised while fetching a URL or writing a tile.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The request could not be completed.
    #[error("Request to {url} failed: {reason}")]
    Request {
        /// Requested URL.
        url: String,
        /// Underlying reason.
        reason: String,
        /// Timeouts and connection errors are worth retrying.
        transient: bool,
    },

    /// The body stream broke off mid-transfer.
    #[error("Transfer of {url} interrupted: {reason}")]
    Interrupted {
        /// Requested URL.
        url: String,
        /// Underlying reason.
        reason: String,
    },

    /// The response could not be interpreted.
    #[error("Malformed response from {url}: {reason}")]
    Malformed {
        /// Requested URL.
        url: String,
        /// What was wrong.
        reason: String,
    },

    /// Downloaded content does not match the announced checksum.
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Requested URL.
        url: String,
        /// Announced SHA-256.
        expected: String,
        /// Computed SHA-256.
        actual: String,
    },

    /// Downloaded content does not match the announced size.
    #[error("Size mismatch for {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Requested URL.
        url: String,
        /// Announced size.
        expected: u64,
        /// Received size.
        actual: u64,
    },

    /// The run was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A downloaded archive could not be unpacked.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Writing the tile manifest failed.
    #[error("Landing error: {0}")]
    Landing(#[from] landtiles_core::CoreError),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::Request { transient, .. } => *transient,
            FetchError::Interrupted { .. } => true,
            _ => false,
        }
    }

    /// Report classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::Io(_) | FetchError::Landing(_) => ErrorKind::Io,
            e if e.is_transient() => ErrorKind::TransientFetch,
            _ => ErrorKind::PermanentFetch,
        }
    }
}

/// A state's metadata feed could not be turned into an index.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The feed could not be fetched, even after retries.
    #[error("Metadata feed unavailable: {0}")]
    Unavailable(#[source] FetchError),

    /// The feed was fetched but no row could be parsed.
    #[error("Metadata feed unparseable: {parsed_rows} rows parsed, {malformed_rows} malformed")]
    Unparseable {
        /// Rows that parsed.
        parsed_rows: usize,
        /// Rows that were skipped.
        malformed_rows: usize,
    },

    /// A document was structurally broken (not CSV/JSON/XML at all).
    #[error("Malformed metadata document: {0}")]
    Document(String),

    /// The source entry lacks a link the adapter needs.
    #[error("Source entry has no {0}")]
    MissingLink(&'static str),

    /// The run was cancelled while fetching the feed.
    #[error("Cancelled")]
    Cancelled,
}

/// Storage refused or failed to accept a file.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local I/O failure while copying.
    #[error("Storage I/O error for {key}: {source}")]
    Io {
        /// Object key.
        key: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backend rejected the object.
    #[error("Storage rejected {key}: {reason}")]
    Rejected {
        /// Object key.
        key: String,
        /// Backend message.
        reason: String,
    },
}
