//! Core types for docset-dl

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use url::Url;

/// Textual prefix carried by every document identifier
pub const ID_PREFIX: &str = "EFTA";

/// Number of zero-padded digits following [`ID_PREFIX`]
pub const ID_WIDTH: usize = 8;

/// Largest identifier representable in the fixed-width form
pub const MAX_ID: u32 = 99_999_999;

/// Errors produced while parsing document identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    /// Token does not start with the identifier prefix
    #[error("identifier '{0}' is missing the EFTA prefix")]
    MissingPrefix(String),

    /// Digits are absent, non-numeric, or not exactly [`ID_WIDTH`] long
    #[error("identifier '{0}' must carry exactly 8 digits")]
    BadDigits(String),

    /// Extension is not plain ASCII alphanumerics
    #[error("request '{0}' has an invalid extension")]
    BadExtension(String),

    /// Range endpoints are inverted
    #[error("range {min}..{max} has min greater than max")]
    InvertedRange {
        /// Lower endpoint as written
        min: DocumentId,
        /// Upper endpoint as written
        max: DocumentId,
    },
}

/// Fixed-width, prefixed, numeric document identifier (`EFTA00000001`)
///
/// Ordering is numeric, which coincides with the ordering of the textual form.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(u32);

impl DocumentId {
    /// Create a DocumentId from its numeric value
    ///
    /// Returns `None` when the value does not fit the fixed-width form.
    pub fn new(value: u32) -> Option<Self> {
        (value <= MAX_ID).then_some(Self(value))
    }

    /// Get the numeric value
    pub fn get(&self) -> u32 {
        self.0
    }

    /// The next identifier, if any
    pub fn successor(&self) -> Option<Self> {
        Self::new(self.0.checked_add(1)?)
    }

    /// Iterate every identifier in `self..=last` in ascending order
    pub fn through(self, last: DocumentId) -> impl Iterator<Item = DocumentId> {
        (self.0..=last.0).map(DocumentId)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:0width$}", ID_PREFIX, self.0, width = ID_WIDTH)
    }
}

impl FromStr for DocumentId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .get(..ID_PREFIX.len())
            .filter(|p| p.eq_ignore_ascii_case(ID_PREFIX))
            .map(|_| &trimmed[ID_PREFIX.len()..])
            .ok_or_else(|| ParseIdError::MissingPrefix(s.to_string()))?;

        if digits.len() != ID_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseIdError::BadDigits(s.to_string()));
        }

        digits
            .parse::<u32>()
            .map(DocumentId)
            .map_err(|_| ParseIdError::BadDigits(s.to_string()))
    }
}

impl TryFrom<String> for DocumentId {
    type Error = ParseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.to_string()
    }
}

/// A requested document: identifier plus the extension it was asked for with
///
/// Requests listed without an extension take the configured default one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentRequest {
    /// The requested identifier
    pub id: DocumentId,
    /// Explicit extension without the leading dot (e.g. `mp4`)
    pub extension: Option<String>,
}

impl DocumentRequest {
    /// Request with no explicit extension
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            extension: None,
        }
    }

    /// Request with an explicit extension
    pub fn with_extension(id: DocumentId, extension: impl Into<String>) -> Self {
        Self {
            id,
            extension: Some(extension.into()),
        }
    }

    /// The extension to use, falling back to `default`
    pub fn extension_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.extension.as_deref().unwrap_or(default)
    }

    /// Drop an explicit extension equal to `default`
    ///
    /// `EFTA00000005` and `EFTA00000005.pdf` name the same artifact when `pdf`
    /// is the default, and must compare equal once normalized.
    pub fn normalized(mut self, default: &str) -> Self {
        if self
            .extension
            .as_deref()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(default))
        {
            self.extension = None;
        }
        self
    }
}

/// Whether `ext` is usable as an artifact extension (non-empty ASCII alphanumerics)
pub fn is_valid_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_alphanumeric())
}

impl FromStr for DocumentRequest {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('.') {
            Some((_, ext)) if !ext.is_empty() && !is_valid_extension(ext) => {
                Err(ParseIdError::BadExtension(s.to_string()))
            }
            Some((stem, ext)) if !ext.is_empty() => {
                Ok(Self::with_extension(stem.parse()?, ext.to_string()))
            }
            Some((stem, _)) => Ok(Self::new(stem.parse()?)),
            None => Ok(Self::new(s.parse()?)),
        }
    }
}

impl fmt::Display for DocumentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extension {
            Some(ext) => write!(f, "{}.{}", self.id, ext),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Closed inclusive interval of identifiers represented by one stored artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct CompositeRange {
    min: DocumentId,
    max: DocumentId,
}

/// Unchecked wire form of [`CompositeRange`]
#[derive(Deserialize)]
struct RangeBounds {
    min: DocumentId,
    max: DocumentId,
}

impl TryFrom<RangeBounds> for CompositeRange {
    type Error = ParseIdError;

    fn try_from(bounds: RangeBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.min, bounds.max)
    }
}

impl CompositeRange {
    /// Build a range, rejecting `min > max`
    pub fn new(min: DocumentId, max: DocumentId) -> Result<Self, ParseIdError> {
        if min > max {
            return Err(ParseIdError::InvertedRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Smallest covered identifier
    pub fn min(&self) -> DocumentId {
        self.min
    }

    /// Largest covered identifier
    pub fn max(&self) -> DocumentId {
        self.max
    }

    /// Number of identifiers covered
    pub fn len(&self) -> usize {
        (self.max.0 - self.min.0) as usize + 1
    }

    /// Always false; a range covers at least one identifier
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `id` falls inside the interval
    pub fn contains(&self, id: DocumentId) -> bool {
        self.min <= id && id <= self.max
    }

    /// Every covered identifier, ascending
    pub fn ids(&self) -> impl Iterator<Item = DocumentId> {
        self.min.through(self.max)
    }

    /// Numeric bounds as a std range
    pub fn as_range(&self) -> RangeInclusive<u32> {
        self.min.0..=self.max.0
    }
}

impl fmt::Display for CompositeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.min, self.max)
    }
}

/// Start of one remote dataset partition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetBoundary {
    /// Remote dataset number
    pub dataset: u32,
    /// First identifier held by the dataset (inclusive)
    pub first: DocumentId,
    /// Last identifier held by the dataset, when published
    #[serde(default)]
    pub last: Option<DocumentId>,
}

/// Events emitted by the fetch engine
///
/// Subscribe via [`FetchCoordinator::subscribe`](crate::fetcher::FetchCoordinator::subscribe).
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// An artifact was fetched and stored
    Fetched {
        /// Identifier whose request produced the artifact
        id: DocumentId,
        /// Location it was fetched from
        url: Url,
        /// Range covered when the artifact was composite
        covered: Option<CompositeRange>,
    },
    /// Identifier was already satisfied; no request was made
    Skipped {
        /// The skipped identifier
        id: DocumentId,
    },
    /// Fetching the identifier failed; it stays unsatisfied
    Failed {
        /// The failed identifier
        id: DocumentId,
        /// Human-readable failure
        error: String,
    },
}

/// Counts reported at the end of a fetch run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Artifacts stored as single units
    pub single: usize,
    /// Artifacts stored as composite ranges
    pub composite: usize,
    /// Requests skipped because they were already satisfied
    pub skipped: usize,
    /// Requests that failed to resolve, fetch, extract or persist
    pub failed: usize,
    /// Locations of every stored artifact, in completion order
    pub urls: Vec<Url>,
}

impl FetchSummary {
    /// Total artifacts stored during the run
    pub fn stored(&self) -> usize {
        self.single + self.composite
    }
}
