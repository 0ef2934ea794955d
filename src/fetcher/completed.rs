//! Completed set -- identifiers already satisfied by a stored artifact.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{CompositeRange, DocumentId};

/// Concurrency-safe set of identifiers satisfied during one fetch run
///
/// Cloning shares the underlying set. Every insert completes under the write
/// lock, so a check issued after an insert returns always observes it; a
/// composite range becomes visible as one batch.
#[derive(Clone, Debug, Default)]
pub struct CompletedSet {
    inner: Arc<RwLock<HashSet<DocumentId>>>,
}

impl CompletedSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` is already satisfied
    pub fn contains(&self, id: DocumentId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    /// Mark a single identifier satisfied; returns false if it already was
    pub fn insert(&self, id: DocumentId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    /// Mark every identifier in `range` satisfied in one atomic batch
    ///
    /// Returns how many identifiers were newly added.
    pub fn insert_range(&self, range: CompositeRange) -> usize {
        let mut set = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        set.reserve(range.len());
        range.ids().filter(|id| set.insert(*id)).count()
    }

    /// Mark `range` and the identifier that was requested satisfied as one batch
    ///
    /// `requested` may lie outside `range`. Returns how many identifiers were newly
    /// added.
    pub fn insert_covering(&self, range: CompositeRange, requested: DocumentId) -> usize {
        let mut set = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        set.reserve(range.len() + 1);
        let added = range.ids().filter(|id| set.insert(*id)).count();
        added + usize::from(set.insert(requested))
    }

    /// Number of satisfied identifiers
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is satisfied yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
