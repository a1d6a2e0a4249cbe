//! Error taxonomy for ingestion and authoring.
//!
//! Unresolved prerequisites and guide references are not errors: resolution
//! functions return `Option` and misses are dropped from the output.

use std::fmt;
use thiserror::Error;

use crate::similarity::SimilarMatch;

/// Which uniqueness invariant a candidate document would violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKey {
    CanonicalId,
    Slug,
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKey::CanonicalId => f.write_str("canonical_id"),
            ConflictKey::Slug => f.write_str("slug"),
        }
    }
}

#[derive(Debug, Error)]
pub enum KbError {
    /// Malformed metadata header or unreadable file. The file is skipped.
    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    /// An authoring flow would break `canonical_id` or `(slug, knowledgebase)` uniqueness.
    #[error("duplicate {key}: '{value}' already exists")]
    Conflict { key: ConflictKey, value: String },

    /// The candidate scores at or above the hard threshold against existing documents.
    #[error(
        "similar content detected: {} existing document(s) at or above {threshold:.2}",
        matches.len()
    )]
    SimilarityRejection {
        threshold: f64,
        matches: Vec<SimilarMatch>,
    },

    /// Unrecoverable storage failure (disk full, corrupt index).
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl KbError {
    pub fn parse(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        KbError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
