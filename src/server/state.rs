//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::orchestrator::{AgentInvoker, StubAgent};
use crate::state::config::StateConfig;
use crate::state::sessions::SessionManager;

/// Welcome message seeded into fresh sessions unless overridden.
const DEFAULT_WELCOME: &str =
    "Welcome to my portfolio! Ask me about projects, experience, or whatever you're curious about.";

/// Shared application state.
pub struct AppState {
    /// Per-session transcript and revision-cache registry.
    pub sessions: SessionManager,
    /// Agent invocation boundary.
    pub agent: Arc<dyn AgentInvoker>,
}

impl AppState {
    /// Create application state from `FOLIO_*` environment variables with
    /// the placeholder agent. Failure here is fatal at startup.
    ///
    /// # Errors
    /// Returns an error on invalid configuration or an unusable backing
    /// store.
    pub async fn new() -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = StateConfig::from_env();
        if config.welcome_message.is_none() {
            config.welcome_message = Some(DEFAULT_WELCOME.to_string());
        }
        Self::with_agent(config, Arc::new(StubAgent::new())).await
    }

    /// Create application state with an explicit config and agent.
    ///
    /// # Errors
    /// Returns an error on invalid configuration or an unusable backing
    /// store.
    pub async fn with_agent(
        config: StateConfig,
        agent: Arc<dyn AgentInvoker>,
    ) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let sessions = SessionManager::open(config)
            .await
            .map_err(|e| format!("failed to open session state: {e}"))?;
        Ok(Arc::new(Self { sessions, agent }))
    }
}
