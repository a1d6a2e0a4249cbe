//! Fuzzy duplicate detection between knowledge records.
//!
//! # Scoring
//!
//! ```text
//! similarity(a, b) = 0.4 × dice(title_a, title_b)
//!                  + 0.4 × dice(body_a[..1000], body_b[..1000])
//!                  + 0.2 × tag_overlap(a, b)
//! ```
//!
//! `dice` is the character-bigram Dice coefficient over case-folded text
//! with whitespace removed. `tag_overlap` is `2|A∩B| / (|A| + |B|)`, or 0 when
//! either side has no tags.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::models::KnowledgeRecord;

pub const TITLE_WEIGHT: f64 = 0.4;
pub const CONTENT_WEIGHT: f64 = 0.4;
pub const TAG_WEIGHT: f64 = 0.2;

/// Number of body characters compared.
pub const CONTENT_PREFIX_CHARS: usize = 1000;

/// A candidate scored against a target record.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarMatch {
    pub record: KnowledgeRecord,
    pub score: f64,
}

/// Bigram Dice coefficient between two strings, case-insensitive.
///
/// Whitespace is ignored. Identical strings score 1.0; a string shorter than
/// two characters has no bigrams and scores 0.0 against anything else.
pub fn compare_strings(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let b: Vec<char> = b
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    if a == b {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut intersection = 0usize;
    for pair in b.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                intersection += 1;
            }
        }
    }

    (2.0 * intersection as f64) / ((a.len() - 1) + (b.len() - 1)) as f64
}

fn content_prefix(body: &str) -> String {
    body.chars()
        .take(CONTENT_PREFIX_CHARS)
        .collect::<String>()
        .to_lowercase()
}

fn folded_tags(record: &KnowledgeRecord) -> BTreeSet<String> {
    record
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// `2|A∩B| / (|A| + |B|)`, 0 if either set is empty.
pub fn tag_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let common = a.intersection(b).count();
    (2.0 * common as f64) / (a.len() + b.len()) as f64
}

/// Weighted similarity of two records, in `[0, 1]`.
///
/// Records that agree on every compared field (title, body prefix, tags)
/// score exactly 1.0, including tagless ones.
pub fn similarity(a: &KnowledgeRecord, b: &KnowledgeRecord) -> f64 {
    let content_a = content_prefix(&a.body);
    let content_b = content_prefix(&b.body);
    let tags_a = folded_tags(a);
    let tags_b = folded_tags(b);

    if a.title.to_lowercase() == b.title.to_lowercase()
        && content_a == content_b
        && tags_a == tags_b
    {
        return 1.0;
    }

    let title = compare_strings(&a.title, &b.title);
    let content = compare_strings(&content_a, &content_b);
    let tags = tag_overlap(&tags_a, &tags_b);

    (TITLE_WEIGHT * title + CONTENT_WEIGHT * content + TAG_WEIGHT * tags).clamp(0.0, 1.0)
}

/// Score every candidate except `target` itself and keep those at or above
/// `threshold`, best first.
pub fn find_similar(
    target: &KnowledgeRecord,
    candidates: &[KnowledgeRecord],
    threshold: f64,
) -> Vec<SimilarMatch> {
    let mut matches: Vec<SimilarMatch> = candidates
        .iter()
        .filter(|c| c.canonical_id != target.canonical_id)
        .map(|c| SimilarMatch {
            score: similarity(target, c),
            record: c.clone(),
        })
        .filter(|m| m.score >= threshold)
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}
