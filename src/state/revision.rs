//! HTML revision model for the per-session revision cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One generated or refined HTML fragment, paired with the instruction
/// that produced it. Immutable after creation; promotion reorders position
/// but never mutates fields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HtmlRevision {
    /// Natural-language instruction that produced this HTML. Used only
    /// for similarity matching, not for rendering.
    pub query: String,
    /// The HTML fragment text.
    pub html: String,
    /// Timestamp assigned at creation.
    pub timestamp: DateTime<Utc>,
}

impl HtmlRevision {
    /// Build a revision stamped with the current UTC instant.
    #[must_use]
    pub fn now(query: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            html: html.into(),
            timestamp: Utc::now(),
        }
    }
}

/// UI-history listing projection: index and query, without the HTML body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HtmlRevisionRecord {
    /// Position in the cache (0 = most recent).
    pub id: usize,
    /// Instruction that produced the revision.
    pub query: String,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Project a newest-first revision slice into indexed listing records.
#[must_use]
pub fn format_revisions(revisions: &[HtmlRevision]) -> Vec<HtmlRevisionRecord> {
    revisions
        .iter()
        .enumerate()
        .map(|(id, revision)| HtmlRevisionRecord {
            id,
            query: revision.query.clone(),
            timestamp: revision.timestamp,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_serde_round_trip_preserves_fields() {
        let revision = HtmlRevision::now("Show me your projects", "<div>projects</div>");
        let json = serde_json::to_string(&revision).unwrap();
        let back: HtmlRevision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, revision);
    }

    #[test]
    fn format_revisions_keeps_newest_first_indexing() {
        let revisions = vec![
            HtmlRevision::now("newest", "<p>b</p>"),
            HtmlRevision::now("oldest", "<p>a</p>"),
        ];
        let records = format_revisions(&revisions);
        assert_eq!(records[0].id, 0);
        assert_eq!(records[0].query, "newest");
        assert_eq!(records[1].query, "oldest");
    }
}
