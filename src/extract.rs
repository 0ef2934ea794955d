//! Composite range extraction
//!
//! Some remote documents are multi-page artifacts that bundle a run of
//! consecutive identifiers. The first page carries the smallest identifier and
//! the last page the largest; [`RangeExtractor`] turns raw bytes into an
//! [`ExtractionOutcome`] callers must match exhaustively.
//!
//! Parsing the document format itself is left to a [`PageTextSource`]
//! implementation; [`PageTextRangeExtractor`] applies the identifier rules on top.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractionError;
use crate::types::{CompositeRange, DocumentId};

static DOCUMENT_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"EFTA[0-9]{8}").expect("document identifier pattern is valid")
});

/// What a fetched artifact represents
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// The artifact is the requested document alone
    Single,
    /// The artifact bundles every identifier in the range
    Range(CompositeRange),
    /// Content could not be interpreted; nothing should be stored
    Failed(ExtractionError),
}

/// Decides whether raw document bytes are a single unit or a composite range
pub trait RangeExtractor: Send + Sync {
    /// Inspect `bytes` and classify the artifact
    fn extract(&self, bytes: &[u8]) -> ExtractionOutcome;
}

/// Extractor that treats every artifact as a single unit
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleUnitExtractor;

impl RangeExtractor for SingleUnitExtractor {
    fn extract(&self, _bytes: &[u8]) -> ExtractionOutcome {
        ExtractionOutcome::Single
    }
}

/// Page-level view of a document, supplied by a format parser
pub trait PageTextSource: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self, bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Extracted text of page `index` (zero-based)
    fn page_text(&self, bytes: &[u8], index: usize) -> Result<String, ExtractionError>;
}

/// [`RangeExtractor`] that reads identifiers from the first and last page text
#[derive(Clone, Debug, Default)]
pub struct PageTextRangeExtractor<S> {
    source: S,
}

impl<S: PageTextSource> PageTextRangeExtractor<S> {
    /// Wrap a page text source
    pub fn new(source: S) -> Self {
        Self { source }
    }

    fn extract_range(&self, bytes: &[u8]) -> Result<Option<CompositeRange>, ExtractionError> {
        let pages = self.source.page_count(bytes)?;
        if pages <= 1 {
            return Ok(None);
        }

        let first = self.source.page_text(bytes, 0)?;
        let last = self.source.page_text(bytes, pages - 1)?;

        let min = find_document_ids(&first)
            .min()
            .ok_or(ExtractionError::NoIdentifier { page: "first" })?;
        let max = find_document_ids(&last)
            .max()
            .ok_or(ExtractionError::NoIdentifier { page: "last" })?;

        CompositeRange::new(min, max)
            .map(Some)
            .map_err(|_| ExtractionError::InvertedRange { min, max })
    }
}

impl<S: PageTextSource> RangeExtractor for PageTextRangeExtractor<S> {
    fn extract(&self, bytes: &[u8]) -> ExtractionOutcome {
        match self.extract_range(bytes) {
            Ok(Some(range)) => ExtractionOutcome::Range(range),
            Ok(None) => ExtractionOutcome::Single,
            Err(e) => ExtractionOutcome::Failed(e),
        }
    }
}

/// Every fixed-width identifier occurring in `text`, in order of appearance
pub fn find_document_ids(text: &str) -> impl Iterator<Item = DocumentId> + '_ {
    DOCUMENT_ID_PATTERN
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
}
