//! Request lists
//!
//! A request list is whitespace-delimited text of identifiers, each optionally
//! carrying an extension (`EFTA00000001`, `EFTA00000002.mp4`).

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::DocumentRequest;

/// Parse a request list into deduplicated requests in ascending identifier order
///
/// # Errors
/// Returns [`Error::InvalidId`] for the first token that is not a valid request.
pub fn parse_requests(text: &str) -> Result<Vec<DocumentRequest>> {
    let requests = text
        .split_whitespace()
        .map(|token| {
            token.parse::<DocumentRequest>().inspect_err(|e| {
                tracing::warn!(token, error = %e, "Invalid entry in request list");
            })
        })
        .collect::<std::result::Result<BTreeSet<_>, _>>()?;

    Ok(requests.into_iter().collect())
}

/// Read and parse a request list file
pub async fn load_requests(path: &Path) -> Result<Vec<DocumentRequest>> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read request list {}: {e}", path.display()),
        ))
    })?;
    let requests = parse_requests(&text)?;
    tracing::info!(path = %path.display(), requests = requests.len(), "Loaded request list");
    Ok(requests)
}
