//! Error types for docset-dl
//!
//! Failures split into two families with different propagation rules:
//! - Per-identifier failures ([`ResolutionError`], [`FetchError`], [`ExtractionError`])
//!   are logged and isolated by the fetch engine; one bad document never stops a batch.
//! - Reconciliation failures ([`ReconcileError`]) are fatal and name the offending artifact.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{DocumentId, ParseIdError};

/// Result type alias for docset-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docset-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// Identifier could not be mapped to a dataset
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Fetching a document failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Composite range extraction failed
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Corpus reconciliation failed
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Malformed identifier in an input list
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] ParseIdError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a configuration error tied to one key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Identifier falls below every known dataset boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to determine document location for {id}: no dataset starts at or before it")]
pub struct ResolutionError {
    /// The identifier that could not be resolved
    pub id: DocumentId,
}

/// Network or persistence failure while fetching one document
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read)
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Requested location
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// Requested location
        url: String,
        /// Response status code
        status: u16,
    },

    /// Writing the artifact to storage failed
    #[error("failed to store {path}: {source}")]
    Store {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Composite range could not be derived from document content
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Content could not be parsed into pages
    #[error("unreadable document: {0}")]
    Unreadable(String),

    /// A boundary page carries no identifier matching the fixed-width pattern
    #[error("no document identifier found on the {page} page")]
    NoIdentifier {
        /// Which page was searched ("first" or "last")
        page: &'static str,
    },

    /// The first page's smallest identifier exceeds the last page's largest
    #[error("first page identifier {min} is after last page identifier {max}")]
    InvertedRange {
        /// Smallest identifier on the first page
        min: DocumentId,
        /// Largest identifier on the last page
        max: DocumentId,
    },
}

/// Fatal reconciliation failures
///
/// Each variant names the stored artifact that broke the corpus naming invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Two artifacts claim the same identifier
    #[error("overlapping document identifiers: {filename} claims {id}, already covered by {previous}")]
    Overlap {
        /// The artifact whose merge failed
        filename: String,
        /// First identifier found to be claimed twice
        id: DocumentId,
        /// The artifact that claimed it earlier
        previous: String,
    },

    /// Claimed identifier count disagrees with the measured unit count
    #[error("filename doesn't match number of pages: {filename} claims {claimed}, has {measured}")]
    Integrity {
        /// The offending artifact
        filename: String,
        /// Identifiers encoded in the filename
        claimed: usize,
        /// Units reported by the page counter
        measured: usize,
    },

    /// Filename does not encode an identifier or identifier range
    #[error("cannot parse stored filename {filename}: {reason}")]
    InvalidFilename {
        /// The offending artifact
        filename: String,
        /// Why parsing failed
        reason: String,
    },

    /// Page counter could not measure the artifact
    #[error("failed to count pages of {filename}: {reason}")]
    PageCount {
        /// The artifact being measured
        filename: String,
        /// Why counting failed
        reason: String,
    },
}
