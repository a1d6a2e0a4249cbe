//! Duplicate vetting for authored documents and whole corpora.
//!
//! [`check_duplicate`] is advisory: it reports key collisions and records at
//! or above the soft warning threshold. [`admit`] is the authoring gate: key
//! collisions and records at or above the hard threshold are errors, and only
//! a clean candidate is written.

use serde::Serialize;

use crate::error::{ConflictKey, KbError};
use crate::models::{KnowledgeRecord, QueryFilters};
use crate::similarity::{find_similar, similarity, SimilarMatch};
use crate::store::{Store, UpsertOutcome};

/// Result of vetting one candidate against the store.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    /// A record with the candidate's canonical id already exists.
    pub duplicate_id: bool,
    /// The candidate's slug is taken within its knowledgebase.
    pub duplicate_slug: bool,
    /// Records in the same knowledgebase scoring at or above the threshold.
    pub similar: Vec<SimilarMatch>,
}

impl DuplicateReport {
    pub fn is_clean(&self) -> bool {
        !self.duplicate_id && !self.duplicate_slug && self.similar.is_empty()
    }
}

async fn similar_in_knowledgebase<S: Store + ?Sized>(
    store: &S,
    candidate: &KnowledgeRecord,
    threshold: f64,
) -> Result<Vec<SimilarMatch>, KbError> {
    let existing = store
        .query(&QueryFilters::for_knowledgebase(&candidate.knowledgebase))
        .await?;
    Ok(find_similar(candidate, &existing, threshold))
}

/// Report key collisions and near-duplicates for `candidate` without writing.
pub async fn check_duplicate<S: Store + ?Sized>(
    store: &S,
    candidate: &KnowledgeRecord,
    warn_threshold: f64,
) -> Result<DuplicateReport, KbError> {
    let duplicate_id = store
        .get_by_canonical_id(&candidate.canonical_id)
        .await?
        .is_some();
    let duplicate_slug = store
        .get_by_slug(&candidate.slug, Some(&candidate.knowledgebase))
        .await?
        .is_some();
    let similar = similar_in_knowledgebase(store, candidate, warn_threshold).await?;

    Ok(DuplicateReport {
        duplicate_id,
        duplicate_slug,
        similar,
    })
}

/// Write `candidate` only if it collides with nothing and no existing record
/// in its knowledgebase scores at or above `reject_threshold`.
pub async fn admit<S: Store + ?Sized>(
    store: &S,
    candidate: &KnowledgeRecord,
    reject_threshold: f64,
) -> Result<UpsertOutcome, KbError> {
    if store
        .get_by_canonical_id(&candidate.canonical_id)
        .await?
        .is_some()
    {
        return Err(KbError::Conflict {
            key: ConflictKey::CanonicalId,
            value: candidate.canonical_id.clone(),
        });
    }
    if store
        .get_by_slug(&candidate.slug, Some(&candidate.knowledgebase))
        .await?
        .is_some()
    {
        return Err(KbError::Conflict {
            key: ConflictKey::Slug,
            value: candidate.slug.clone(),
        });
    }

    let matches = similar_in_knowledgebase(store, candidate, reject_threshold).await?;
    if !matches.is_empty() {
        return Err(KbError::SimilarityRejection {
            threshold: reject_threshold,
            matches,
        });
    }

    tracing::info!(canonical_id = %candidate.canonical_id, "admitted new document");
    Ok(store.upsert(candidate).await?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    CanonicalId,
    Slug,
    Similarity,
}

/// One suspicious pair found by [`find_duplicate_pairs`].
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub kind: DuplicateKind,
    pub first: KnowledgeRecord,
    pub second: KnowledgeRecord,
    pub score: f64,
}

/// Scan every unordered pair of a parsed corpus.
///
/// A pair is reported once, under the first rule it trips: shared canonical
/// id, then shared slug at the same level of the same knowledgebase, then
/// similarity at or above `threshold`.
pub fn find_duplicate_pairs(records: &[KnowledgeRecord], threshold: f64) -> Vec<DuplicatePair> {
    let mut pairs = Vec::new();
    for (i, first) in records.iter().enumerate() {
        for second in &records[i + 1..] {
            let found = if first.canonical_id == second.canonical_id {
                Some((DuplicateKind::CanonicalId, 1.0))
            } else if first.slug == second.slug
                && first.level == second.level
                && first.knowledgebase == second.knowledgebase
            {
                Some((DuplicateKind::Slug, 1.0))
            } else {
                let score = similarity(first, second);
                (score >= threshold).then_some((DuplicateKind::Similarity, score))
            };

            if let Some((kind, score)) = found {
                pairs.push(DuplicatePair {
                    kind,
                    first: first.clone(),
                    second: second.clone(),
                    score,
                });
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;
    use crate::similarity::tests::record;
    use crate::store::memory::InMemoryStore;

    fn seeded() -> InMemoryStore {
        InMemoryStore::with_records(vec![
            record(
                "android-01",
                "Introduction to Android",
                Level::Beginner,
                1,
                &["architecture", "fundamentals"],
                "This is a test content about Android development basics.",
            ),
            record(
                "kotlin-03",
                "Kotlin Coroutines",
                Level::Intermediate,
                3,
                &["kotlin", "coroutines"],
                "This is about Kotlin coroutines and async programming.",
            ),
        ])
    }

    fn near_duplicate() -> KnowledgeRecord {
        record(
            "android-02",
            "Introduction to Android Development",
            Level::Beginner,
            2,
            &["architecture", "fundamentals"],
            "This is a test content about Android development basics and fundamentals.",
        )
    }

    #[tokio::test]
    async fn test_check_duplicate_reports_similar() {
        let store = seeded();
        let report = check_duplicate(&store, &near_duplicate(), 0.5).await.unwrap();
        assert!(!report.duplicate_id);
        assert!(!report.duplicate_slug);
        assert_eq!(report.similar.len(), 1);
        assert_eq!(report.similar[0].record.canonical_id, "android-01");
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_check_duplicate_flags_keys() {
        let store = seeded();
        let mut candidate = record("android-01", "Other", Level::Beginner, 9, &[], "zzz");
        candidate.slug = "kotlin-03".into();
        let report = check_duplicate(&store, &candidate, 0.5).await.unwrap();
        assert!(report.duplicate_id);
        assert!(report.duplicate_slug);
    }

    #[tokio::test]
    async fn test_admit_rejects_near_duplicate() {
        let store = seeded();
        let err = admit(&store, &near_duplicate(), 0.6).await.unwrap_err();
        match err {
            KbError::SimilarityRejection { matches, threshold } => {
                assert_eq!(threshold, 0.6);
                assert_eq!(matches[0].record.canonical_id, "android-01");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.get_by_canonical_id("android-02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_admit_conflicts_on_keys() {
        let store = seeded();
        let same_id = record("kotlin-03", "Unrelated", Level::Beginner, 5, &[], "qqq");
        match admit(&store, &same_id, 0.6).await {
            Err(KbError::Conflict { key, value }) => {
                assert_eq!(key, ConflictKey::CanonicalId);
                assert_eq!(value, "kotlin-03");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let mut same_slug = record("fresh-id", "Unrelated", Level::Beginner, 5, &[], "qqq");
        same_slug.slug = "android-01".into();
        assert!(matches!(
            admit(&store, &same_slug, 0.6).await,
            Err(KbError::Conflict {
                key: ConflictKey::Slug,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_admit_writes_clean_candidate() {
        let store = seeded();
        let fresh = record(
            "gradle-01",
            "Gradle Build Variants",
            Level::Advanced,
            1,
            &["gradle"],
            "Flavors, build types and signing configs.",
        );
        assert_eq!(admit(&store, &fresh, 0.6).await.unwrap(), UpsertOutcome::Inserted);
        assert!(store.get_by_canonical_id("gradle-01").await.unwrap().is_some());
    }

    #[test]
    fn test_pair_scan_kinds() {
        let a = record("a", "Coroutines", Level::Beginner, 1, &["k"], "body one");
        let a_again = record("a", "Something else", Level::Beginner, 2, &[], "xyz");
        let mut b = record("b", "Flows", Level::Beginner, 3, &[], "qrs");
        b.slug = "shared".into();
        let mut c = record("c", "Channels", Level::Beginner, 4, &[], "tuv");
        c.slug = "shared".into();

        let pairs = find_duplicate_pairs(&[a, a_again, b, c], 0.99);
        let kinds: Vec<DuplicateKind> = pairs.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![DuplicateKind::CanonicalId, DuplicateKind::Slug]);
    }

    #[test]
    fn test_pair_scan_similarity() {
        let records = vec![
            record(
                "android-01",
                "Introduction to Android",
                Level::Beginner,
                1,
                &["architecture", "fundamentals"],
                "This is a test content about Android development basics.",
            ),
            near_duplicate(),
        ];
        let pairs = find_duplicate_pairs(&records, 0.6);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].kind, DuplicateKind::Similarity);
        assert!(pairs[0].score >= 0.6);
    }
}
