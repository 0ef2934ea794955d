//! Dataset partition table and identifier-to-location resolution
//!
//! The remote store splits the corpus into numbered datasets, each holding a
//! contiguous run of identifiers. [`DatasetIndex`] holds the partition table and
//! maps an identifier to the dataset whose first identifier is the greatest one
//! not exceeding it (closed lower bound).

use crate::error::{Error, ResolutionError, Result};
use crate::types::{DatasetBoundary, DocumentId, DocumentRequest};
use url::Url;

/// Published (dataset, first, last) numbers for the remote store
const PUBLISHED_BOUNDARIES: &[(u32, u32, u32)] = &[
    (1, 1, 3_158),
    (2, 3_159, 3_857),
    (3, 3_858, 5_704),
    (4, 5_705, 8_408),
    (5, 8_409, 8_528),
    (6, 8_529, 9_015),
    (7, 9_016, 9_675),
    (8, 9_676, 39_024),
    (9, 39_025, 377_003),
    (10, 1_262_782, 1_925_959),
    (11, 2_212_883, 2_340_018),
    (12, 2_730_265, 2_731_789),
];

/// The default boundary table
pub fn default_boundaries() -> Vec<DatasetBoundary> {
    PUBLISHED_BOUNDARIES
        .iter()
        .filter_map(|&(dataset, first, last)| {
            Some(DatasetBoundary {
                dataset,
                first: DocumentId::new(first)?,
                last: DocumentId::new(last),
            })
        })
        .collect()
}

/// Check that a boundary table is non-empty, strictly increasing by first
/// identifier, and that no dataset ends before it starts
///
/// # Errors
/// Returns [`Error::Config`] keyed on `datasets`.
pub fn validate_boundaries(boundaries: &[DatasetBoundary]) -> Result<()> {
    if boundaries.is_empty() {
        return Err(Error::config("datasets", "dataset table is empty"));
    }
    for pair in boundaries.windows(2) {
        if pair[0].first >= pair[1].first {
            return Err(Error::config(
                "datasets",
                format!(
                    "dataset {} starts at {} which is not after dataset {} at {}",
                    pair[1].dataset, pair[1].first, pair[0].dataset, pair[0].first
                ),
            ));
        }
    }
    if let Some(b) = boundaries
        .iter()
        .find(|b| b.last.is_some_and(|last| last < b.first))
    {
        return Err(Error::config(
            "datasets",
            format!("dataset {} ends before it starts", b.dataset),
        ));
    }
    Ok(())
}

/// Immutable, validated dataset partition table
#[derive(Clone, Debug)]
pub struct DatasetIndex {
    base: Url,
    boundaries: Vec<DatasetBoundary>,
}

impl DatasetIndex {
    /// Build an index over `boundaries`
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the table fails [`validate_boundaries`] or if
    /// `base` is not an absolute URL that can hold path segments.
    pub fn new(base: &str, boundaries: Vec<DatasetBoundary>) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| Error::config("base_url", format!("invalid base URL '{base}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::config(
                "base_url",
                format!("'{base}' cannot carry a path"),
            ));
        }
        validate_boundaries(&boundaries)?;

        Ok(Self { base, boundaries })
    }

    /// Index over the published table, rooted at `base`
    pub fn with_default_boundaries(base: &str) -> Result<Self> {
        Self::new(base, default_boundaries())
    }

    /// Boundaries in ascending order
    pub fn boundaries(&self) -> &[DatasetBoundary] {
        &self.boundaries
    }

    /// Find the dataset holding `id`
    pub fn dataset_for(&self, id: DocumentId) -> std::result::Result<&DatasetBoundary, ResolutionError> {
        self.boundaries
            .iter()
            .rev()
            .find(|b| b.first <= id)
            .ok_or(ResolutionError { id })
    }

    /// Canonical remote location of a requested document
    ///
    /// Produces `{base}/DataSet {N}/{id}.{ext}`, with `default_ext` used when the
    /// request carries no extension of its own.
    pub fn resolve(
        &self,
        request: &DocumentRequest,
        default_ext: &str,
    ) -> std::result::Result<Url, ResolutionError> {
        let boundary = self.dataset_for(request.id)?;
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&format!("DataSet {}", boundary.dataset))
                .push(&format!("{}.{}", request.id, request.extension_or(default_ext)));
        }
        Ok(url)
    }

    /// Map stored artifact filenames back to the remote locations they came from
    ///
    /// Composite artifacts resolve through their smallest identifier; names without
    /// an extension take `default_ext`. Names that do not parse, or that fall below
    /// every dataset, are skipped with a warning.
    pub fn infer_locations<'a, I>(&self, filenames: I, default_ext: &str) -> Vec<Url>
    where
        I: IntoIterator<Item = &'a str>,
    {
        filenames
            .into_iter()
            .filter_map(|name| {
                let artifact = match crate::reconcile::parse_artifact_name(name) {
                    Ok(artifact) => artifact,
                    Err(e) => {
                        tracing::warn!(filename = name, error = %e, "skipping unparseable artifact");
                        return None;
                    }
                };
                let request = match artifact.extension {
                    Some(ext) => DocumentRequest::with_extension(artifact.range.min(), ext),
                    None => DocumentRequest::new(artifact.range.min()),
                };
                match self.resolve(&request, default_ext) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(filename = name, error = %e, "skipping unresolvable artifact");
                        None
                    }
                }
            })
            .collect()
    }

    /// Largest identifier named by the table
    ///
    /// Uses the final dataset's last identifier when published, otherwise its first.
    pub fn max_known(&self) -> DocumentId {
        self.boundaries
            .iter()
            .map(|b| b.last.unwrap_or(b.first))
            .max()
            .unwrap_or(self.boundaries[0].first)
    }
}
