//! Session keying and the per-session store registry.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::state::config::{StateBackend, StateConfig};
use crate::state::errors::StateResult;
use crate::state::html_cache::{MemoryRevisionStore, RevisionStore};
use crate::state::message::ChatRole;
use crate::state::sqlite_store::{SqliteListStore, SqliteRevisionStore, SqliteTranscriptStore};
use crate::state::transcript::{MemoryTranscriptStore, TranscriptStore};

/// Fixed identifier used by single-session deployments and clients that
/// present no session key.
pub const DEFAULT_SESSION: &str = "default";

/// Mint a fresh session identifier for a new client.
#[must_use]
pub fn mint_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The two session-scoped stores, correlated only by session identifier.
pub struct SessionStores {
    /// Append-only chat transcript.
    pub transcript: Arc<dyn TranscriptStore>,
    /// Recency-ordered HTML revision cache.
    pub revisions: Arc<dyn RevisionStore>,
}

/// Registry handing out per-session stores, creating them lazily.
///
/// Holds the selected backend; both stores of a session always come from
/// the same backend.
pub struct SessionManager {
    config: StateConfig,
    durable: Option<Arc<SqliteListStore>>,
    sessions: DashMap<String, Arc<SessionStores>>,
}

impl SessionManager {
    /// Open the manager, connecting the durable store when configured.
    ///
    /// # Errors
    /// Returns an error on invalid configuration or when the durable
    /// store cannot be opened; both are fatal at startup.
    pub async fn open(config: StateConfig) -> StateResult<Self> {
        config.validate()?;
        let durable = match config.backend {
            StateBackend::Memory => None,
            StateBackend::Sqlite => Some(Arc::new(
                SqliteListStore::open(&config.sqlite_path, config.ttl_seconds).await?,
            )),
        };
        Ok(Self {
            config,
            durable,
            sessions: DashMap::new(),
        })
    }

    /// Stores for `session_id`, created on first touch. A configured
    /// welcome message is seeded into an empty transcript so restored
    /// durable sessions are not re-seeded.
    ///
    /// # Errors
    /// Returns an error if the backing store fails.
    pub async fn session(&self, session_id: &str) -> StateResult<Arc<SessionStores>> {
        let (stores, created) = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let stores = Arc::new(self.build_stores(session_id));
                vacant.insert(Arc::clone(&stores));
                (stores, true)
            }
        };

        if created {
            if let Some(welcome) = &self.config.welcome_message {
                if stores.transcript.size().await? == 0 {
                    stores
                        .transcript
                        .append(ChatRole::Agent, welcome.clone())
                        .await?;
                }
            }
        }

        Ok(stores)
    }

    /// Similarity threshold the handlers should pass to `find_similar`.
    #[must_use]
    pub const fn similarity_threshold(&self) -> f64 {
        self.config.similarity_threshold
    }

    fn build_stores(&self, session_id: &str) -> SessionStores {
        match &self.durable {
            Some(durable) => SessionStores {
                transcript: Arc::new(SqliteTranscriptStore::new(
                    Arc::clone(durable),
                    session_id,
                    self.config.max_chat_messages,
                )),
                revisions: Arc::new(SqliteRevisionStore::new(
                    Arc::clone(durable),
                    session_id,
                    self.config.max_html_revisions,
                )),
            },
            None => SessionStores {
                transcript: Arc::new(MemoryTranscriptStore::new(self.config.max_chat_messages)),
                revisions: Arc::new(MemoryRevisionStore::new(self.config.max_html_revisions)),
            },
        }
    }
}
