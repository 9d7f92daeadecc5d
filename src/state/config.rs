//! Configuration for the conversational state subsystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::errors::{StateError, StateResult};
use crate::state::similarity::DEFAULT_SIMILARITY_THRESHOLD;

/// Default transcript bound (`FOLIO_MAX_CHAT_MESSAGES`).
pub const DEFAULT_MAX_CHAT_MESSAGES: usize = 100;
/// Default revision cache bound (`FOLIO_MAX_HTML_REVISIONS`).
pub const DEFAULT_MAX_HTML_REVISIONS: usize = 10;
/// Default sliding expiration for durable session records, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Backing store for session state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    /// Process-local, bounded, non-durable.
    #[default]
    Memory,
    /// Durable keyed lists in `SQLite`, TTL-bound, shared across processes.
    Sqlite,
}

/// Settings for the transcript store, revision cache, and session registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateConfig {
    /// Which backing store to use.
    pub backend: StateBackend,
    /// Database path for the `Sqlite` backend.
    pub sqlite_path: PathBuf,
    /// Maximum messages retained per session transcript.
    pub max_chat_messages: usize,
    /// Maximum revisions retained per session cache.
    pub max_html_revisions: usize,
    /// Sliding expiration for durable session records, in seconds.
    pub ttl_seconds: u64,
    /// Combined-similarity threshold for `find_similar`.
    pub similarity_threshold: f64,
    /// Agent message seeded into an empty transcript, if any.
    pub welcome_message: Option<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Memory,
            sqlite_path: PathBuf::from("folio_state.db"),
            max_chat_messages: DEFAULT_MAX_CHAT_MESSAGES,
            max_html_revisions: DEFAULT_MAX_HTML_REVISIONS,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            welcome_message: None,
        }
    }
}

impl StateConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `FOLIO_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(backend) = std::env::var("FOLIO_STATE_BACKEND") {
            if backend.eq_ignore_ascii_case("sqlite") {
                config.backend = StateBackend::Sqlite;
            }
        }
        if let Ok(path) = std::env::var("FOLIO_STATE_DB") {
            config.sqlite_path = PathBuf::from(path);
        }
        if let Some(max) = env_usize("FOLIO_MAX_CHAT_MESSAGES") {
            config.max_chat_messages = max;
        }
        if let Some(max) = env_usize("FOLIO_MAX_HTML_REVISIONS") {
            config.max_html_revisions = max;
        }
        if let Ok(welcome) = std::env::var("FOLIO_WELCOME_MESSAGE") {
            if !welcome.is_empty() {
                config.welcome_message = Some(welcome);
            }
        }

        config
    }

    /// Set the backing store.
    #[must_use]
    pub const fn with_backend(mut self, backend: StateBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the database path for the `Sqlite` backend.
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = path.into();
        self
    }

    /// Set the transcript bound.
    #[must_use]
    pub const fn with_max_chat_messages(mut self, max: usize) -> Self {
        self.max_chat_messages = max;
        self
    }

    /// Set the revision cache bound.
    #[must_use]
    pub const fn with_max_html_revisions(mut self, max: usize) -> Self {
        self.max_html_revisions = max;
        self
    }

    /// Set the welcome message seeded into empty transcripts.
    #[must_use]
    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = Some(message.into());
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> StateResult<()> {
        if self.max_chat_messages == 0 {
            return Err(StateError::InvalidConfig(
                "max_chat_messages must be > 0".to_string(),
            ));
        }
        if self.max_html_revisions == 0 {
            return Err(StateError::InvalidConfig(
                "max_html_revisions must be > 0".to_string(),
            ));
        }
        if self.ttl_seconds == 0 {
            return Err(StateError::InvalidConfig(
                "ttl_seconds must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(StateError::InvalidConfig(
                "similarity_threshold must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StateConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let config = StateConfig::default().with_max_chat_messages(0);
        assert!(config.validate().is_err());
        let config = StateConfig::default().with_max_html_revisions(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = StateConfig::default();
        config.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builders_compose() {
        let config = StateConfig::new()
            .with_backend(StateBackend::Sqlite)
            .with_sqlite_path("/tmp/state.db")
            .with_max_html_revisions(3)
            .with_welcome_message("Welcome!");
        assert_eq!(config.backend, StateBackend::Sqlite);
        assert_eq!(config.max_html_revisions, 3);
        assert_eq!(config.welcome_message.as_deref(), Some("Welcome!"));
    }
}
