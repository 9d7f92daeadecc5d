//! Append-only, bounded chat transcript per session.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::state::errors::StateResult;
use crate::state::message::{ChatMessage, ChatRole};

/// Boxed future type for state store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-session transcript store contract.
///
/// The backing structure keeps newest-first for cheap bounded insertion;
/// the public contract always returns oldest-first.
pub trait TranscriptStore: Send + Sync {
    /// Append a message, stamping it with the current UTC instant and
    /// discarding the oldest entries beyond the configured bound.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn append(&self, role: ChatRole, content: String) -> StoreFuture<'_, StateResult<()>>;

    /// All retained messages in chronological order (oldest first).
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn all(&self) -> StoreFuture<'_, StateResult<Vec<ChatMessage>>>;

    /// Remove every message for the session.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn clear(&self) -> StoreFuture<'_, StateResult<()>>;

    /// Number of retained messages.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn size(&self) -> StoreFuture<'_, StateResult<usize>>;
}

/// Process-local transcript store backed by a bounded deque.
pub struct MemoryTranscriptStore {
    max_size: usize,
    messages: Mutex<VecDeque<ChatMessage>>,
}

impl MemoryTranscriptStore {
    /// Create an empty store retaining at most `max_size` messages.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ChatMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn append(&self, role: ChatRole, content: String) -> StoreFuture<'_, StateResult<()>> {
        Box::pin(async move {
            let mut messages = self.lock();
            messages.push_front(ChatMessage::now(role, content));
            messages.truncate(self.max_size);
            Ok(())
        })
    }

    fn all(&self) -> StoreFuture<'_, StateResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            // Stored newest-first; reverse into conversation order.
            Ok(self.lock().iter().rev().cloned().collect())
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
