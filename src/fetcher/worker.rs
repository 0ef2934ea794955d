//! Per-identifier unit of work: check, resolve, fetch, classify, persist, record.

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::error::Error;
use crate::extract::ExtractionOutcome;
use crate::retry::fetch_with_retry;
use crate::types::{CompositeRange, DocumentRequest, Event, ParseIdError, is_valid_extension};

use super::FetchCoordinator;
use super::storage::{composite_name, single_name, write_artifact};

/// Result of handling one request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Identifier was already satisfied; no request was made
    Skipped,
    /// An artifact was stored
    Stored {
        /// Location the artifact came from
        url: Url,
        /// Where it was written
        path: PathBuf,
        /// Range covered, for composite artifacts
        covered: Option<CompositeRange>,
    },
    /// The request failed; the identifier stays unsatisfied
    Failed(Error),
}

impl FetchCoordinator {
    /// Handle a single request
    ///
    /// Failures are logged and returned as [`FetchOutcome::Failed`]; they leave the
    /// identifier out of the completed set so a later run retries it.
    pub async fn fetch_one(&self, request: &DocumentRequest) -> FetchOutcome {
        let id = request.id;

        if self.completed.contains(id) {
            tracing::debug!(document_id = %id, "Already satisfied, skipping");
            self.event_tx.send(Event::Skipped { id }).ok();
            return FetchOutcome::Skipped;
        }

        let outcome = self.fetch_and_store(request).await;
        match &outcome {
            FetchOutcome::Stored { url, covered, .. } => {
                tracing::debug!(document_id = %id, url = %url, covered = ?covered, "Stored artifact");
                self.event_tx
                    .send(Event::Fetched {
                        id,
                        url: url.clone(),
                        covered: *covered,
                    })
                    .ok();
            }
            FetchOutcome::Failed(e) => {
                tracing::warn!(document_id = %id, error = %e, "Failed to fetch document");
                self.event_tx
                    .send(Event::Failed {
                        id,
                        error: e.to_string(),
                    })
                    .ok();
            }
            FetchOutcome::Skipped => {}
        }
        outcome
    }

    async fn fetch_and_store(&self, request: &DocumentRequest) -> FetchOutcome {
        let fetch = &self.config.fetch;
        let ext = request.extension_or(&fetch.default_extension).to_string();

        if !is_valid_extension(&ext) {
            return FetchOutcome::Failed(Error::InvalidId(ParseIdError::BadExtension(
                request.to_string(),
            )));
        }

        let url = match self.index.resolve(request, &fetch.default_extension) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Failed(e.into()),
        };

        let bytes = match fetch_with_retry(&self.config.retry, || self.source.fetch(&url)).await {
            Ok(bytes) => bytes,
            Err(e) => return FetchOutcome::Failed(e.into()),
        };

        // Only documents in the default format can bundle several identifiers
        let (bytes, covered) = if ext.eq_ignore_ascii_case(&fetch.default_extension) {
            match self.classify(bytes).await {
                Ok(classified) => classified,
                Err(e) => return FetchOutcome::Failed(e),
            }
        } else {
            (bytes, None)
        };

        let name = match covered {
            Some(range) => composite_name(range, &ext),
            None => single_name(request.id, &ext),
        };

        let path = match write_artifact(&fetch.output_dir, &name, &bytes).await {
            Ok(path) => path,
            Err(e) => return FetchOutcome::Failed(e.into()),
        };

        match covered {
            Some(range) => {
                self.completed.insert_covering(range, request.id);
            }
            None => {
                self.completed.insert(request.id);
            }
        }

        FetchOutcome::Stored { url, path, covered }
    }

    /// Run the range extractor off the async workers
    ///
    /// Hands the bytes back alongside the covered range, if any.
    async fn classify(
        &self,
        bytes: Vec<u8>,
    ) -> Result<(Vec<u8>, Option<CompositeRange>), Error> {
        let extractor = Arc::clone(&self.extractor);
        let (bytes, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = extractor.extract(&bytes);
            (bytes, outcome)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("extraction task failed: {e}"))))?;

        match outcome {
            ExtractionOutcome::Single => Ok((bytes, None)),
            ExtractionOutcome::Range(range) => Ok((bytes, Some(range))),
            ExtractionOutcome::Failed(e) => Err(e.into()),
        }
    }
}
