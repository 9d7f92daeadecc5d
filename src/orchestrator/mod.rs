//! Boundary to the external agent/LLM layer.
//!
//! The core hands an instruction string in and gets a structured result
//! out; how the result was produced is not its concern. Everything the
//! collaborator may touch during one request — the session's revision
//! cache, the progress sender — travels in an explicit [`RequestContext`]
//! owned by that request, never through a process-wide slot.

pub mod kb;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::orchestrator::kb::{KnowledgeBase, build_kb_context};
use crate::progress::ProgressSender;
use crate::state::html_cache::RevisionStore;

/// Per-request view of session state handed to the agent layer.
pub struct RequestContext {
    /// The requesting session's revision cache, for refinement and reuse.
    pub revisions: Arc<dyn RevisionStore>,
    /// Progress sender for this request's stream.
    pub progress: ProgressSender,
    /// Threshold for treating a stored query as a near-duplicate.
    pub similarity_threshold: f64,
}

/// Structured result of one agent invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Whether the invocation produced a usable result.
    pub success: bool,
    /// Chat-style response text, present on success and failure alike.
    pub chat_message: String,
    /// Generated or refined HTML fragment, only on success.
    pub html: Option<String>,
    /// Failure description when `success` is false.
    pub error_message: Option<String>,
}

impl AgentOutcome {
    /// Build a failure outcome with a chat-visible error text.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            chat_message: message.clone(),
            html: None,
            error_message: Some(message),
        }
    }
}

/// Contract for the external agent invocation.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Process `instruction`, emitting progress on the context's sender as
    /// work advances. Implementations run for LLM-call durations; callers
    /// drive them on a secondary worker so stream delivery never blocks.
    ///
    /// # Errors
    /// Returns an error when the invocation itself fails; a well-formed
    /// negative result comes back as `AgentOutcome { success: false, .. }`.
    async fn invoke(
        &self,
        instruction: &str,
        ctx: &RequestContext,
    ) -> anyhow::Result<AgentOutcome>;
}

/// Placeholder agent for local runs without an LLM backend.
///
/// Reuses a cached revision when the instruction is a near-duplicate of a
/// stored query, consults an attached knowledge base otherwise, and echoes
/// the instruction as its chat message. Generates no new HTML.
#[derive(Default)]
pub struct StubAgent {
    knowledge_base: Option<Box<dyn KnowledgeBase>>,
}

impl StubAgent {
    /// Create a stub agent without retrieval.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a knowledge base consulted on every invocation.
    #[must_use]
    pub fn with_knowledge_base(mut self, knowledge_base: Box<dyn KnowledgeBase>) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }
}

#[async_trait]
impl AgentInvoker for StubAgent {
    async fn invoke(
        &self,
        instruction: &str,
        ctx: &RequestContext,
    ) -> anyhow::Result<AgentOutcome> {
        ctx.progress.emit("Analyzing request...");

        if let Some(hit) = ctx
            .revisions
            .find_similar(instruction, ctx.similarity_threshold)
            .await?
        {
            ctx.progress.emit("Restoring a matching view...");
            return Ok(AgentOutcome {
                success: true,
                chat_message: format!(
                    "Restored a previously generated view for a similar request: {}",
                    hit.query
                ),
                html: Some(hit.html),
                error_message: None,
            });
        }

        let mut context = String::new();
        if let Some(knowledge_base) = &self.knowledge_base {
            ctx.progress.emit("Searching knowledge base...");
            let chunks = knowledge_base.retrieve(instruction).await?;
            ctx.progress
                .emit(format!("Found {} relevant documents", chunks.len()));
            context = build_kb_context(&chunks);
        }

        let chat_message = if context.is_empty() {
            format!("No agent backend is configured. You asked: {instruction}")
        } else {
            format!(
                "No agent backend is configured. You asked: {instruction} \
                 ({} characters of context were retrieved)",
                context.len()
            )
        };

        Ok(AgentOutcome {
            success: true,
            chat_message,
            html: None,
            error_message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::kb::{KbChunk, StaticKnowledgeBase};
    use crate::progress::{Drained, HEARTBEAT_INTERVAL, relay};
    use crate::state::html_cache::MemoryRevisionStore;

    fn context(
        revisions: Arc<dyn RevisionStore>,
        progress: ProgressSender,
    ) -> RequestContext {
        RequestContext {
            revisions,
            progress,
            similarity_threshold: 0.8,
        }
    }

    #[tokio::test]
    async fn stub_agent_reports_retrieval_progress() {
        let kb = StaticKnowledgeBase::new(vec![KbChunk {
            text: "a fact about projects".into(),
            score: 0.9,
        }]);
        let agent = StubAgent::new().with_knowledge_base(Box::new(kb));

        let (sender, mut receiver) = relay();
        let ctx = context(Arc::new(MemoryRevisionStore::new(10)), sender.clone());
        let outcome = agent.invoke("show projects", &ctx).await.unwrap();
        sender.done();

        assert!(outcome.success);
        assert!(outcome.html.is_none());

        let mut messages = Vec::new();
        loop {
            match receiver.next_or_heartbeat(HEARTBEAT_INTERVAL).await {
                Drained::Message(message) => messages.push(message),
                Drained::Heartbeat => continue,
                Drained::Finished => break,
            }
        }
        assert_eq!(messages[0], "Analyzing request...");
        assert!(messages.contains(&"Searching knowledge base...".to_string()));
    }

    #[tokio::test]
    async fn near_duplicate_instruction_reuses_cached_html() {
        let revisions = Arc::new(MemoryRevisionStore::new(10));
        revisions
            .add("show me your projects".into(), "<div>projects</div>".into())
            .await
            .unwrap();

        let agent = StubAgent::new();
        let (sender, _receiver) = relay();
        let ctx = context(revisions, sender);

        let outcome = agent.invoke("show me your projects!", &ctx).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.html.as_deref(), Some("<div>projects</div>"));
    }

    #[test]
    fn failure_outcome_carries_the_error_text() {
        let outcome = AgentOutcome::failure("knowledge base unreachable");
        assert!(!outcome.success);
        assert!(outcome.html.is_none());
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("knowledge base unreachable")
        );
    }
}
