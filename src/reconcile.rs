//! Corpus reconciliation
//!
//! Expands stored artifact filenames (single `EFTA00000001.pdf` or composite
//! `EFTA00000001_EFTA00000003.pdf`) into the identifiers they cover, refuses
//! corpora where two artifacts claim the same identifier, and lists every
//! expected identifier that no artifact covers.
//!
//! # Example
//!
//! ```no_run
//! use docset_dl::config::UniverseMode;
//! use docset_dl::dataset::default_boundaries;
//! use docset_dl::reconcile::{CorpusReconciler, ReportTarget, write_report};
//! use std::path::PathBuf;
//!
//! # fn example() -> docset_dl::Result<()> {
//! let reconciler = CorpusReconciler::new(default_boundaries(), UniverseMode::IntervalsOnly)?;
//! let report = reconciler.reconcile_dirs(&[PathBuf::from("./downloads")], "pdf")?;
//! write_report(&report.missing, &ReportTarget::Stdout)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use walkdir::WalkDir;

use crate::config::{Config, UniverseMode};
use crate::dataset::validate_boundaries;
use crate::error::{ExtractionError, ReconcileError, Result};
use crate::extract::PageTextSource;
use crate::types::{CompositeRange, DatasetBoundary, DocumentId, ID_PREFIX};

/// Identifiers encoded by one stored artifact's filename
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredArtifact {
    /// The filename as found
    pub name: String,
    /// Identifiers covered; a single-unit artifact covers a one-element range
    pub range: CompositeRange,
    /// Extension without the leading dot
    pub extension: Option<String>,
}

impl StoredArtifact {
    /// Whether the artifact covers more than one identifier
    pub fn is_composite(&self) -> bool {
        self.range.len() > 1
    }
}

/// Parse an artifact filename into the identifiers it covers
///
/// The upper endpoint of a range may omit the prefix (`EFTA00000001_00000003.pdf`).
pub fn parse_artifact_name(name: &str) -> std::result::Result<StoredArtifact, ReconcileError> {
    let invalid = |reason: String| ReconcileError::InvalidFilename {
        filename: name.to_string(),
        reason,
    };

    let (stem, extension) = match name.split_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext.to_string())),
        Some((stem, _)) => (stem, None),
        None => (name, None),
    };

    let range = match stem.split_once('_') {
        Some((low, high)) => {
            let low: DocumentId = low.parse().map_err(|e| invalid(format!("{e}")))?;
            let high = parse_endpoint(high).map_err(&invalid)?;
            CompositeRange::new(low, high).map_err(|e| invalid(e.to_string()))?
        }
        None => {
            let id: DocumentId = stem.parse().map_err(|e| invalid(format!("{e}")))?;
            CompositeRange::new(id, id).map_err(|e| invalid(e.to_string()))?
        }
    };

    Ok(StoredArtifact {
        name: name.to_string(),
        range,
        extension,
    })
}

fn parse_endpoint(text: &str) -> std::result::Result<DocumentId, String> {
    text.parse()
        .or_else(|_| format!("{ID_PREFIX}{text}").parse())
        .map_err(|e| format!("{e}"))
}

/// Independent unit count for a stored artifact (e.g. a PDF page counter)
pub trait PageCounter {
    /// Number of units (pages) in the artifact at `path`
    fn count_pages(&self, path: &Path) -> std::result::Result<usize, ExtractionError>;
}

/// [`PageCounter`] that reads the file and asks a [`PageTextSource`]
#[derive(Clone, Debug, Default)]
pub struct SourcePageCounter<S> {
    source: S,
}

impl<S: PageTextSource> SourcePageCounter<S> {
    /// Wrap a page text source
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: PageTextSource> PageCounter for SourcePageCounter<S> {
    fn count_pages(&self, path: &Path) -> std::result::Result<usize, ExtractionError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractionError::Unreadable(e.to_string()))?;
        self.source.page_count(&bytes)
    }
}

/// Identifier to claiming artifact, rebuilt on every reconciliation
#[derive(Debug, Default)]
pub struct CorpusIndex {
    claims: HashMap<DocumentId, Arc<str>>,
    max_observed: Option<DocumentId>,
}

impl CorpusIndex {
    /// Merge an artifact's identifiers, failing if any is already claimed
    ///
    /// The covered count must grow by exactly the artifact's cardinality.
    pub fn claim(&mut self, artifact: &StoredArtifact) -> std::result::Result<(), ReconcileError> {
        let owner: Arc<str> = Arc::from(artifact.name.as_str());
        let before = self.claims.len();

        self.claims.reserve(artifact.range.len());
        for id in artifact.range.ids() {
            self.claims.entry(id).or_insert_with(|| Arc::clone(&owner));
        }

        if self.claims.len() - before != artifact.range.len() {
            let (id, previous) = artifact
                .range
                .ids()
                .find_map(|id| {
                    self.claims
                        .get(&id)
                        .filter(|claimant| !Arc::ptr_eq(claimant, &owner))
                        .map(|claimant| (id, claimant.to_string()))
                })
                .unwrap_or((artifact.range.min(), artifact.name.clone()));
            return Err(ReconcileError::Overlap {
                filename: artifact.name.clone(),
                id,
                previous,
            });
        }

        self.max_observed = self.max_observed.max(Some(artifact.range.max()));
        Ok(())
    }

    /// Whether some artifact covers `id`
    pub fn covers(&self, id: DocumentId) -> bool {
        self.claims.contains_key(&id)
    }

    /// The artifact covering `id`
    pub fn claimant(&self, id: DocumentId) -> Option<&str> {
        self.claims.get(&id).map(|c| c.as_ref())
    }

    /// Number of covered identifiers
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether nothing is covered
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Largest covered identifier
    pub fn max_observed(&self) -> Option<DocumentId> {
        self.max_observed
    }
}

/// Outcome of a successful reconciliation
#[derive(Debug)]
pub struct Reconciliation {
    /// Coverage built from the corpus
    pub index: CorpusIndex,
    /// Expected identifiers no artifact covers, ascending
    pub missing: Vec<DocumentId>,
}

/// Validates a corpus and diffs it against the expected identifier universe
pub struct CorpusReconciler {
    boundaries: Vec<DatasetBoundary>,
    mode: UniverseMode,
    page_counter: Option<Box<dyn PageCounter>>,
}

impl CorpusReconciler {
    /// Reconciler over a dataset table (ascending by first identifier)
    ///
    /// # Errors
    /// Returns [`Error::Config`](crate::Error::Config) if the table fails
    /// [`validate_boundaries`].
    pub fn new(boundaries: Vec<DatasetBoundary>, mode: UniverseMode) -> Result<Self> {
        validate_boundaries(&boundaries)?;
        Ok(Self {
            boundaries,
            mode,
            page_counter: None,
        })
    }

    /// Reconciler over the configured dataset table and universe mode
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.datasets.clone(), config.reconcile.universe)
    }

    /// Universe construction mode in use
    pub fn mode(&self) -> UniverseMode {
        self.mode
    }

    /// Enable the page-count integrity check (reads every artifact)
    pub fn with_page_counter(mut self, counter: Box<dyn PageCounter>) -> Self {
        self.page_counter = Some(counter);
        self
    }

    /// Reconcile a listing of artifact filenames
    ///
    /// The page-count check needs file contents and is skipped here.
    pub fn reconcile_names<I, S>(&self, names: I) -> Result<Reconciliation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = CorpusIndex::default();
        for name in names {
            let artifact = parse_artifact_name(name.as_ref())?;
            self.merge(&mut index, &artifact)?;
        }
        Ok(self.finish(index))
    }

    /// Reconcile artifacts at `paths`, running the page-count check when enabled
    pub fn reconcile_paths(&self, paths: &[PathBuf]) -> Result<Reconciliation> {
        let mut index = CorpusIndex::default();
        for path in paths {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ReconcileError::InvalidFilename {
                    filename: path.display().to_string(),
                    reason: "not valid UTF-8".to_string(),
                })?;
            let artifact = parse_artifact_name(name)?;
            if let Some(counter) = &self.page_counter {
                check_page_count(counter.as_ref(), path, &artifact)?;
            }
            self.merge(&mut index, &artifact)?;
        }
        Ok(self.finish(index))
    }

    /// Scan `dirs` recursively and reconcile every `EFTA*.{ext}` artifact found
    pub fn reconcile_dirs(&self, dirs: &[PathBuf], ext: &str) -> Result<Reconciliation> {
        let paths = scan_directories(dirs, ext)?;
        self.reconcile_paths(&paths)
    }

    fn merge(
        &self,
        index: &mut CorpusIndex,
        artifact: &StoredArtifact,
    ) -> std::result::Result<(), ReconcileError> {
        index.claim(artifact).inspect_err(|e| {
            tracing::error!(filename = %artifact.name, error = %e, "Overlapping document identifiers");
        })
    }

    fn finish(&self, index: CorpusIndex) -> Reconciliation {
        let universe = self.expected_universe(index.max_observed());
        let missing: Vec<DocumentId> = universe
            .into_iter()
            .flatten()
            .filter_map(DocumentId::new)
            .filter(|id| !index.covers(*id))
            .collect();

        tracing::info!(
            covered = index.len(),
            missing = missing.len(),
            mode = ?self.mode,
            "Reconciliation finished"
        );
        Reconciliation { index, missing }
    }

    /// Expected identifiers as ascending, non-overlapping numeric intervals
    pub fn expected_universe(&self, max_observed: Option<DocumentId>) -> Vec<RangeInclusive<u32>> {
        let observed = max_observed.map_or(0, |id| id.get());
        match self.mode {
            UniverseMode::Exhaustive => {
                let known = self
                    .boundaries
                    .iter()
                    .map(|b| b.last.unwrap_or(b.first).get())
                    .max()
                    .unwrap_or(0);
                vec![1..=known.max(observed)]
            }
            UniverseMode::IntervalsOnly => {
                let mut intervals: Vec<RangeInclusive<u32>> = Vec::new();
                for (i, boundary) in self.boundaries.iter().enumerate() {
                    let first = boundary.first.get();
                    let last = match (boundary.last, self.boundaries.get(i + 1)) {
                        (Some(last), _) => last.get(),
                        (None, Some(next)) => next.first.get().saturating_sub(1),
                        (None, None) => observed,
                    };
                    if last < first {
                        continue;
                    }
                    match intervals.last_mut() {
                        Some(prev) if first <= prev.end().saturating_add(1) => {
                            *prev = *prev.start()..=last.max(*prev.end());
                        }
                        _ => intervals.push(first..=last),
                    }
                }
                intervals
            }
        }
    }
}

fn check_page_count(
    counter: &dyn PageCounter,
    path: &Path,
    artifact: &StoredArtifact,
) -> std::result::Result<(), ReconcileError> {
    let measured = counter
        .count_pages(path)
        .map_err(|e| ReconcileError::PageCount {
            filename: artifact.name.clone(),
            reason: e.to_string(),
        })?;
    if measured != artifact.range.len() {
        tracing::error!(
            filename = %artifact.name,
            claimed = artifact.range.len(),
            measured,
            "Filename doesn't match number of pages"
        );
        return Err(ReconcileError::Integrity {
            filename: artifact.name.clone(),
            claimed: artifact.range.len(),
            measured,
        });
    }
    Ok(())
}

/// Recursively collect `EFTA*.{ext}` files under `dirs`, sorted by path
pub fn scan_directories(dirs: &[PathBuf], ext: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for dir in dirs {
        tracing::info!(dir = %dir.display(), "Finding artifacts");
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let matches_ext = name
                .rsplit_once('.')
                .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext));
            if name.starts_with(ID_PREFIX) && matches_ext {
                paths.push(entry.into_path());
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Where the missing-identifier report goes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReportTarget {
    /// Standard output
    Stdout,
    /// A file; gzip-compressed when the name ends in `.gz`
    File(PathBuf),
}

impl ReportTarget {
    /// `"stdout"` selects standard output, anything else is a path
    pub fn from_arg(arg: &str) -> Self {
        if arg == "stdout" {
            ReportTarget::Stdout
        } else {
            ReportTarget::File(PathBuf::from(arg))
        }
    }
}

/// Write one identifier per line in fixed-width form
pub fn write_report(missing: &[DocumentId], target: &ReportTarget) -> Result<()> {
    match target {
        ReportTarget::Stdout => {
            let stdout = std::io::stdout();
            write_ids(stdout.lock(), missing)?.flush()?;
        }
        ReportTarget::File(path) if is_gzip(path) => {
            let encoder = GzEncoder::new(File::create(path)?, Compression::default());
            write_ids(encoder, missing)?.finish()?.flush()?;
        }
        ReportTarget::File(path) => {
            write_ids(BufWriter::new(File::create(path)?), missing)?.flush()?;
        }
    }
    Ok(())
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.trim().eq_ignore_ascii_case("gz"))
}

fn write_ids<W: Write>(mut out: W, ids: &[DocumentId]) -> std::io::Result<W> {
    for id in ids {
        writeln!(out, "{id}")?;
    }
    Ok(out)
}
