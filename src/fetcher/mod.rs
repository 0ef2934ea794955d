//! Concurrent, deduplicating fetch engine.
//!
//! Split into focused submodules:
//! - [`completed`] - Shared set of identifiers already satisfied
//! - [`source`] - Network seam ([`DocumentSource`]) and session credentials
//! - [`storage`] - Artifact naming, atomic writes, seeding from disk
//! - [`worker`] - The per-identifier unit of work

pub mod completed;
pub mod source;
mod storage;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use completed::CompletedSet;
pub use source::{Credentials, DocumentSource, HttpDocumentSource};
pub use worker::FetchOutcome;

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::config::Config;
use crate::dataset::DatasetIndex;
use crate::error::Result;
use crate::extract::RangeExtractor;
use crate::types::{DocumentRequest, Event, FetchSummary};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Fetch engine for one run (cloneable - all fields are Arc-wrapped)
///
/// Owns the run's [`CompletedSet`]. Create a new coordinator per run so the
/// set is rebuilt from the output directory rather than carried over in memory.
#[derive(Clone)]
pub struct FetchCoordinator {
    /// Configuration (wrapped in Arc for sharing across workers)
    pub(crate) config: Arc<Config>,
    /// Dataset partition table
    pub(crate) index: Arc<DatasetIndex>,
    /// Where document bytes come from
    pub(crate) source: Arc<dyn DocumentSource>,
    /// Composite range classifier
    pub(crate) extractor: Arc<dyn RangeExtractor>,
    /// Identifiers satisfied so far in this run
    pub(crate) completed: CompletedSet,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl FetchCoordinator {
    /// Create a coordinator that fetches over HTTP with `credentials`
    ///
    /// # Errors
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid configuration
    /// or dataset table, or if the HTTP client cannot be built.
    pub fn new(
        config: Config,
        credentials: &Credentials,
        extractor: Arc<dyn RangeExtractor>,
    ) -> Result<Self> {
        let source = HttpDocumentSource::new(credentials, config.fetch.request_timeout)?;
        Self::with_source(config, Arc::new(source), extractor)
    }

    /// Create a coordinator over any [`DocumentSource`]
    pub fn with_source(
        config: Config,
        source: Arc<dyn DocumentSource>,
        extractor: Arc<dyn RangeExtractor>,
    ) -> Result<Self> {
        config.validate()?;
        let index = DatasetIndex::new(&config.fetch.base_url, config.datasets.clone())?;
        let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config: Arc::new(config),
            index: Arc::new(index),
            source,
            extractor,
            completed: CompletedSet::new(),
            event_tx,
        })
    }

    /// Subscribe to fetch events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The run's completed set
    pub fn completed(&self) -> &CompletedSet {
        &self.completed
    }

    /// The dataset index used for resolution
    pub fn index(&self) -> &DatasetIndex {
        &self.index
    }

    /// Mark identifiers covered by artifacts already in the output directory
    ///
    /// Returns the number of identifiers newly marked.
    pub async fn seed_from_output(&self) -> Result<usize> {
        let added = storage::seed_completed(&self.config.fetch.output_dir, &self.completed).await?;
        tracing::info!(
            output_dir = %self.config.fetch.output_dir.display(),
            identifiers = added,
            "Seeded completed set from existing artifacts"
        );
        Ok(added)
    }

    /// Fetch every request not already satisfied, with bounded concurrency
    ///
    /// Requests are deduplicated and processed in ascending identifier order; an
    /// explicit extension equal to the default one is dropped first.
    /// Per-identifier failures are logged and counted; they never abort the run.
    ///
    /// # Errors
    /// Only setup failures (creating or reading the output directory) are returned.
    pub async fn run(&self, requests: Vec<DocumentRequest>) -> Result<FetchSummary> {
        let default_ext = &self.config.fetch.default_extension;
        let mut requests: Vec<DocumentRequest> = requests
            .into_iter()
            .map(|request| request.normalized(default_ext))
            .collect();
        requests.sort();
        requests.dedup();

        tokio::fs::create_dir_all(&self.config.fetch.output_dir).await?;
        if self.config.fetch.seed_from_output {
            self.seed_from_output().await?;
        }

        let concurrency = self.config.fetch.concurrency.max(1);
        tracing::info!(
            requests = requests.len(),
            concurrency,
            "Starting fetch run"
        );

        let outcomes: Vec<FetchOutcome> = stream::iter(requests)
            .map(|request| {
                let coordinator = self.clone();
                async move { coordinator.fetch_one(&request).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let summary = summarize(outcomes);
        tracing::info!(
            single = summary.single,
            composite = summary.composite,
            skipped = summary.skipped,
            failed = summary.failed,
            "Fetch run finished"
        );
        Ok(summary)
    }
}

/// Fold per-request outcomes into run totals
fn summarize(outcomes: Vec<FetchOutcome>) -> FetchSummary {
    let mut summary = FetchSummary::default();
    for outcome in outcomes {
        match outcome {
            FetchOutcome::Skipped => summary.skipped += 1,
            FetchOutcome::Stored { url, covered, .. } => {
                if covered.is_some() {
                    summary.composite += 1;
                } else {
                    summary.single += 1;
                }
                summary.urls.push(url);
            }
            FetchOutcome::Failed(_) => summary.failed += 1,
        }
    }
    summary
}
