//! Artifact storage -- naming, atomic writes, and re-deriving state from disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::FetchError;
use crate::reconcile::parse_artifact_name;
use crate::types::{CompositeRange, DocumentId};

use super::completed::CompletedSet;

/// Filename of a single-unit artifact
pub(crate) fn single_name(id: DocumentId, ext: &str) -> String {
    format!("{id}.{ext}")
}

/// Filename of a composite artifact keyed by both endpoints
pub(crate) fn composite_name(range: CompositeRange, ext: &str) -> String {
    format!("{range}.{ext}")
}

/// Sequence number keeping concurrent temp files for one name apart
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn temp_name(name: &str) -> String {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(".{name}.{}-{seq}.part", std::process::id())
}

/// Write `bytes` to `dir/name` through a temporary sibling and a rename
///
/// Every call writes its own hidden `.part` file, so concurrent writers of the
/// same name never share a temp file and the last rename wins. A crash mid-write
/// leaves only the `.part` file, which never parses as an artifact name.
pub(crate) async fn write_artifact(
    dir: &Path,
    name: &str,
    bytes: &[u8],
) -> Result<PathBuf, FetchError> {
    let path = dir.join(name);
    let temp = dir.join(temp_name(name));

    let store_err = |source: std::io::Error| FetchError::Store {
        path: path.clone(),
        source,
    };

    tokio::fs::write(&temp, bytes).await.map_err(store_err)?;
    if let Err(e) = tokio::fs::rename(&temp, &path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(store_err(e));
    }
    Ok(path)
}

/// Mark every identifier covered by artifacts already in `dir` as completed
///
/// Only the top level of `dir` is read. Entries whose names do not parse are
/// ignored. Returns the number of identifiers newly marked.
pub(crate) async fn seed_completed(dir: &Path, completed: &CompletedSet) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut added = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        match parse_artifact_name(name) {
            Ok(artifact) => added += completed.insert_range(artifact.range),
            Err(e) => tracing::trace!(filename = name, error = %e, "ignoring non-artifact file"),
        }
    }
    Ok(added)
}
