//! # docset-dl
//!
//! Fetch engine and reconciler for a large, partitioned corpus of documents
//! addressed by fixed-width identifiers (`EFTA00000001`).
//!
//! ## Design Philosophy
//!
//! docset-dl is designed to be:
//! - **Library-first** - No CLI, purely a Rust crate for embedding
//! - **Restartable** - Progress is derived from the artifacts on disk, so an
//!   interrupted run resumes without persisted state
//! - **Event-driven** - Consumers subscribe to fetch events, no polling required
//!
//! A [`FetchCoordinator`] resolves each requested identifier to a location in
//! its dataset, downloads it with bounded concurrency, and stores it either as a
//! single artifact or, when the document turns out to bundle a contiguous run of
//! identifiers, as one composite artifact named after both endpoints. Every
//! identifier a composite covers is marked satisfied so it is never fetched
//! again. A [`CorpusReconciler`] later checks the stored names for overlaps and
//! reports which expected identifiers are still missing.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docset_dl::{Config, Credentials, FetchCoordinator, SingleUnitExtractor, load_requests};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let credentials = Credentials::from_json(r#"{"session": "abc"}"#)?;
//!     let coordinator =
//!         FetchCoordinator::new(config, &credentials, Arc::new(SingleUnitExtractor))?;
//!
//!     let mut events = coordinator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let requests = load_requests(Path::new("ids.txt")).await?;
//!     let summary = coordinator.run(requests).await?;
//!     println!("stored {}, failed {}", summary.stored(), summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Dataset partition table and location resolution
pub mod dataset;
/// Error types
pub mod error;
/// Composite range extraction from document content
pub mod extract;
/// Concurrent fetch engine
pub mod fetcher;
/// Request list parsing
pub mod input;
/// Corpus reconciliation and missing-identifier reports
pub mod reconcile;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, UniverseMode};
pub use dataset::DatasetIndex;
pub use error::{
    Error, ExtractionError, FetchError, ReconcileError, ResolutionError, Result,
};
pub use extract::{
    ExtractionOutcome, PageTextRangeExtractor, PageTextSource, RangeExtractor,
    SingleUnitExtractor,
};
pub use fetcher::{CompletedSet, Credentials, DocumentSource, FetchCoordinator, FetchOutcome};
pub use input::{load_requests, parse_requests};
pub use reconcile::{CorpusReconciler, PageCounter, ReportTarget, write_report};
pub use types::{CompositeRange, DatasetBoundary, DocumentId, DocumentRequest, Event, FetchSummary};

/// Run a fetch, stopping early on a termination signal.
///
/// Returns `Ok(None)` if a signal arrived first. In-flight requests are dropped;
/// artifacts are only ever renamed into place once complete, so the next run
/// seeds from whatever was stored and carries on.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use docset_dl::{Config, Credentials, FetchCoordinator, SingleUnitExtractor, parse_requests, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator = FetchCoordinator::new(
///         Config::default(),
///         &Credentials::default(),
///         Arc::new(SingleUnitExtractor),
///     )?;
///     let requests = parse_requests("EFTA00000001 EFTA00000002")?;
///
///     match run_with_shutdown(&coordinator, requests).await? {
///         Some(summary) => println!("done: {} stored", summary.stored()),
///         None => println!("interrupted"),
///     }
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    coordinator: &FetchCoordinator,
    requests: Vec<DocumentRequest>,
) -> Result<Option<FetchSummary>> {
    tokio::select! {
        summary = coordinator.run(requests) => summary.map(Some),
        _ = wait_for_signal() => {
            tracing::info!(
                completed = coordinator.completed().len(),
                "Fetch run interrupted"
            );
            Ok(None)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
