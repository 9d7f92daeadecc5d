//! Recency-ordered, similarity-aware cache of HTML revisions per session.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::state::errors::StateResult;
use crate::state::revision::HtmlRevision;
use crate::state::similarity;
use crate::state::transcript::StoreFuture;

/// Per-session revision cache contract. Most-recent-first ordering.
pub trait RevisionStore: Send + Sync {
    /// Insert a revision at the head, stamping it with the current UTC
    /// instant and discarding the tail beyond the configured bound.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn add(&self, query: String, html: String) -> StoreFuture<'_, StateResult<()>>;

    /// All retained revisions, most recent first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn all(&self) -> StoreFuture<'_, StateResult<Vec<HtmlRevision>>>;

    /// Revision at `index` (0 = most recent); `None` when out of range.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, index: usize) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>>;

    /// The most recent revision, if any.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn latest(&self) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>> {
        self.get(0)
    }

    /// Best stored revision whose query clears `threshold` on the
    /// combined similarity score; recency wins ties.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_similar(
        &self,
        query: &str,
        threshold: f64,
    ) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>>;

    /// Move the first revision with identical field values to the head.
    /// A vanished entry is a silent no-op, not an error.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn promote(&self, entry: &HtmlRevision) -> StoreFuture<'_, StateResult<()>>;

    /// Remove every revision for the session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn clear(&self) -> StoreFuture<'_, StateResult<()>>;

    /// Number of retained revisions.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn size(&self) -> StoreFuture<'_, StateResult<usize>>;
}

/// Process-local revision cache backed by a bounded deque, head = newest.
pub struct MemoryRevisionStore {
    max_size: usize,
    revisions: Mutex<VecDeque<HtmlRevision>>,
}

impl MemoryRevisionStore {
    /// Create an empty cache retaining at most `max_size` revisions.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            revisions: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HtmlRevision>> {
        self.revisions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn add(&self, query: String, html: String) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move {
            let mut revisions = self.lock();
            revisions.push_front(HtmlRevision::now(query, html));
            revisions.truncate(self.max_size);
            Ok(())
        })
    }

    fn all(&self) -> StoreFuture<'_, StateResult<Vec<HtmlRevision>>> {
        Box::pin(async move { Ok(self.lock().iter().cloned().collect()) })
    }

    fn get(&self, index: usize) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>> {
        Box::pin(async move { Ok(self.lock().get(index).cloned()) })
    }

    fn find_similar(
        &self,
        query: &str,
        threshold: f64,
    ) -> StoreFuture<'_, StateResult<Option<HtmlRevision>>> {
        let query = query.to_string();
        Box::pin(async move {
            let revisions: Vec<HtmlRevision> = self.lock().iter().cloned().collect();
            Ok(similarity::best_match(&revisions, &query, threshold).cloned())
        })
    }

    fn promote(&self, entry: &HtmlRevision) -> StoreFuture<'_, StateResult<()>> {
        let entry = entry.clone();
        Box::pin(async move {
            let mut revisions = self.lock();
            // Remove one matching occurrence and reinsert at the head, so
            // promotion never duplicates.
            if let Some(position) = revisions.iter().position(|stored| *stored == entry) {
                revisions.remove(position);
                revisions.push_front(entry);
            }
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move {
            self.lock().clear();
            Ok(())
        })
    }

    fn size(&self) -> StoreFuture<'_, StateResult<usize>> {
        Box::pin(async move { Ok(self.lock().len()) })
    }
}
