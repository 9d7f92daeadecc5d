//! Knowledge-base collaborator interface.
//!
//! A thin contract over a managed vector-search service; the core never
//! inspects how chunks are produced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One retrieved text chunk with its relevance score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KbChunk {
    /// Chunk text.
    pub text: String,
    /// Relevance score, higher is better.
    pub score: f64,
}

/// Retrieval contract implemented by the knowledge-base client.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Retrieve relevant chunks for `query`, already score-filtered.
    ///
    /// # Errors
    /// Returns an error if the retrieval call fails.
    async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<KbChunk>>;
}

/// Concatenate chunks into a context block, highest score first, with no
/// length cap.
#[must_use]
pub fn build_kb_context(chunks: &[KbChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<&KbChunk> = chunks.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    sorted
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// In-memory knowledge base serving a fixed chunk list; used in tests and
/// local runs without a managed search service.
#[derive(Clone, Debug, Default)]
pub struct StaticKnowledgeBase {
    chunks: Vec<KbChunk>,
}

impl StaticKnowledgeBase {
    /// Serve the given chunks for every query.
    #[must_use]
    pub fn new(chunks: Vec<KbChunk>) -> Self {
        Self { chunks }
    }
}

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
    async fn retrieve(&self, _query: &str) -> anyhow::Result<Vec<KbChunk>> {
        Ok(self.chunks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_orders_by_score_descending() {
        let chunks = vec![
            KbChunk {
                text: "lower".into(),
                score: 0.4,
            },
            KbChunk {
                text: "higher".into(),
                score: 0.9,
            },
        ];
        assert_eq!(build_kb_context(&chunks), "higher\n\n---\n\nlower");
    }

    #[test]
    fn context_of_no_chunks_is_empty() {
        assert_eq!(build_kb_context(&[]), "");
    }

    #[tokio::test]
    async fn static_kb_serves_its_chunks() {
        let kb = StaticKnowledgeBase::new(vec![KbChunk {
            text: "fact".into(),
            score: 0.8,
        }]);
        let chunks = kb.retrieve("anything").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "fact");
    }
}
