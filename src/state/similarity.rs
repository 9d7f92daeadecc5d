//! Token-based similarity scoring for revision queries.
//!
//! Detects near-duplicate instructions with a weighted blend of cosine
//! similarity over term-frequency vectors and Jaccard similarity over
//! deduplicated token sets.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::state::revision::HtmlRevision;

/// Weight of the cosine component in the combined score.
const COSINE_WEIGHT: f64 = 0.7;
/// Weight of the Jaccard component in the combined score.
const JACCARD_WEIGHT: f64 = 0.3;

/// Default threshold for considering two queries near-duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

// The pattern is a literal; construction cannot fail.
#[allow(clippy::unwrap_used)]
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

/// Lowercase, strip punctuation, and split on whitespace.
///
/// Tokens are not deduplicated; the cosine component works over the
/// multiset of tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = NON_WORD.replace_all(&lowered, "");
    cleaned.split_whitespace().map(ToString::to_string).collect()
}

/// Cosine similarity between two token multisets, treated as sparse
/// term-frequency vectors. Returns 0 when either vector is empty or the
/// denominator is 0.
#[must_use]
pub fn cosine_similarity(tokens_a: &[String], tokens_b: &[String]) -> f64 {
    let counts_a = term_counts(tokens_a);
    let counts_b = term_counts(tokens_b);

    let numerator: f64 = counts_a
        .iter()
        .filter_map(|(token, count_a)| counts_b.get(token).map(|count_b| count_a * count_b))
        .sum();
    if numerator == 0.0 {
        return 0.0;
    }

    let sum_a: f64 = counts_a.values().map(|count| count * count).sum();
    let sum_b: f64 = counts_b.values().map(|count| count * count).sum();
    let denominator = sum_a.sqrt() * sum_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    numerator / denominator
}

/// Jaccard similarity between two deduplicated token sets. Returns 0 when
/// the union is empty.
#[must_use]
pub fn jaccard_similarity(tokens_a: &[String], tokens_b: &[String]) -> f64 {
    let set_a: HashSet<&str> = tokens_a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = tokens_b.iter().map(String::as_str).collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    let intersection = u32::try_from(intersection).unwrap_or(u32::MAX);
    let union = u32::try_from(union).unwrap_or(u32::MAX);
    f64::from(intersection) / f64::from(union)
}

/// Combined similarity: 0.7 x cosine + 0.3 x jaccard.
#[must_use]
pub fn combined_similarity(query_a: &str, query_b: &str) -> f64 {
    let tokens_a = tokenize(query_a);
    let tokens_b = tokenize(query_b);
    let cosine = cosine_similarity(&tokens_a, &tokens_b);
    let jaccard = jaccard_similarity(&tokens_a, &tokens_b);
    JACCARD_WEIGHT.mul_add(jaccard, COSINE_WEIGHT * cosine)
}

/// Find the stored revision whose query best matches `query`.
///
/// `revisions` must be in newest-first order. Returns the entry with the
/// highest combined score strictly greater than `threshold`; ties keep the
/// entry encountered first, so recency wins. `None` when nothing qualifies.
#[must_use]
pub fn best_match<'a>(
    revisions: &'a [HtmlRevision],
    query: &str,
    threshold: f64,
) -> Option<&'a HtmlRevision> {
    let query_tokens = tokenize(query);

    let mut best_score = -1.0_f64;
    let mut best_entry: Option<&HtmlRevision> = None;

    for revision in revisions {
        let entry_tokens = tokenize(&revision.query);
        let cosine = cosine_similarity(&query_tokens, &entry_tokens);
        let jaccard = jaccard_similarity(&query_tokens, &entry_tokens);
        let combined = JACCARD_WEIGHT.mul_add(jaccard, COSINE_WEIGHT * cosine);
        tracing::debug!(score = combined, entry = %revision.query, "similarity score");

        if combined > threshold && combined > best_score {
            best_score = combined;
            best_entry = Some(revision);
        }
    }

    best_entry
}

fn term_counts(tokens: &[String]) -> HashMap<&str, f64> {
    let mut counts: HashMap<&str, f64> = HashMap::new();
    for token in tokens {
        *counts.entry(token.as_str()).or_insert(0.0) += 1.0;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        assert_eq!(
            tokenize("Show me your PROJECTS, please!"),
            vec!["show", "me", "your", "projects", "please"]
        );
        assert!(tokenize("?!.,").is_empty());
    }

    #[test]
    fn cosine_is_one_for_identical_and_zero_for_disjoint() {
        let a = tokenize("show projects");
        let b = tokenize("show projects");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);

        let c = tokenize("something else");
        assert_eq!(cosine_similarity(&a, &c), 0.0);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn cosine_uses_term_frequencies_not_sets() {
        let a = tokenize("spam spam spam");
        let b = tokenize("spam");
        // Both vectors point in the same direction, so cosine is 1.
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_handles_empty_union() {
        assert_eq!(jaccard_similarity(&[], &[]), 0.0);
        let a = tokenize("show projects");
        assert_eq!(jaccard_similarity(&a, &[]), 0.0);
    }

    #[test]
    fn worked_example_stays_below_default_threshold() {
        // tokens {show, me, your, projects} vs {show, projects, please}:
        // jaccard = 2/5 = 0.4, cosine = 2 / (sqrt(4) * sqrt(3)) ~= 0.577,
        // combined ~= 0.524.
        let score = combined_similarity("show me your projects", "show projects please");
        assert!((score - (0.7 * (2.0 / (4.0_f64.sqrt() * 3.0_f64.sqrt())) + 0.3 * 0.4)).abs() < 1e-9);
        assert!(score < DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn best_match_requires_strictly_greater_than_threshold() {
        let revisions = vec![HtmlRevision::now("show projects please", "<div/>")];
        assert!(best_match(&revisions, "show me your projects", 0.8).is_none());
        // Identical queries score 1.0 and qualify.
        let found = best_match(&revisions, "show projects, please!", 0.8);
        assert_eq!(found.map(|r| r.query.as_str()), Some("show projects please"));
    }

    #[test]
    fn best_match_prefers_recency_on_ties() {
        let revisions = vec![
            HtmlRevision::now("show projects", "<p>new</p>"),
            HtmlRevision::now("show projects", "<p>old</p>"),
        ];
        let found = best_match(&revisions, "show projects", 0.8);
        assert_eq!(found.map(|r| r.html.as_str()), Some("<p>new</p>"));
    }

    #[test]
    fn best_match_on_empty_slice_is_none() {
        assert!(best_match(&[], "anything at all", 0.0).is_none());
    }
}
