//! Conversational state for the portfolio agent, organized into:
//! - `config`: backend selection, bounds, TTL, similarity threshold
//! - `errors`: subsystem error type and result alias
//! - `message` / `revision`: immutable entry models and web projections
//! - `similarity`: token-based combined similarity scoring
//! - `transcript`: bounded, append-only chat transcript store
//! - `html_cache`: recency-ordered, similarity-aware revision cache
//! - `sqlite_store`: durable keyed-list backend with sliding expiry
//! - `sessions`: session keying and the per-session store registry

pub mod config;
pub mod errors;
pub mod html_cache;
pub mod message;
pub mod revision;
pub mod sessions;
pub mod similarity;
pub mod sqlite_store;
pub mod transcript;

// Re-export commonly used types for convenience
pub use config::{StateBackend, StateConfig};
pub use errors::{StateError, StateResult};
pub use html_cache::{MemoryRevisionStore, RevisionStore};
pub use message::{ChatMessage, ChatMessageRecord, ChatRole, format_messages};
pub use revision::{HtmlRevision, HtmlRevisionRecord, format_revisions};
pub use sessions::{DEFAULT_SESSION, SessionManager, SessionStores, mint_session_id};
pub use similarity::{DEFAULT_SIMILARITY_THRESHOLD, combined_similarity};
pub use sqlite_store::{SqliteListStore, SqliteRevisionStore, SqliteTranscriptStore};
pub use transcript::{MemoryTranscriptStore, StoreFuture, TranscriptStore};
