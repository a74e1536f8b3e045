//! Result deduplication by full value.
//!
//! Two results are the same asset only when every field matches, so the
//! seen-set is keyed by the whole [`SearchResult`]. A deduplicator lives for
//! one retrieval run.

use std::collections::HashSet;

use cyberetrieve_sources::{QueryLimit, SearchResult};

/// Tracks the distinct results a run has published so far.
#[derive(Debug)]
pub(crate) struct Deduplicator {
    seen: HashSet<SearchResult>,
    limit: QueryLimit,
}

impl Deduplicator {
    pub(crate) fn new(limit: QueryLimit) -> Self {
        Self {
            seen: HashSet::new(),
            limit,
        }
    }

    /// Record a result, returning it only on first occurrence.
    pub(crate) fn admit(&mut self, result: &SearchResult) -> bool {
        if self.is_full() || self.seen.contains(result) {
            return false;
        }
        self.seen.insert(result.clone())
    }

    /// Whether the run has published as many distinct results as it asked for.
    pub(crate) fn is_full(&self) -> bool {
        self.limit.is_satisfied_by(self.seen.len())
    }

    /// Distinct results admitted so far.
    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }
}
