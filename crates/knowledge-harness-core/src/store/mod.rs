//! Storage abstraction for Knowledge Harness.
//!
//! The [`Store`] trait defines every storage operation the ingestion,
//! authoring, and roadmap pipelines need, so they can run against SQLite in
//! the CLI and against [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    KnowledgeRecord, KnowledgebaseSummary, Level, ProjectRecord, ProjectTopicSummary, QueryFilters,
    TopicSummary,
};
use crate::resolve;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored record already had identical content.
    Unchanged,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](Store::upsert) | Insert or fully replace a record by canonical id |
/// | [`query`](Store::query) | Filtered listing, ordered by sequence number |
/// | [`search`](Store::search) | Full-text search plus the same filters |
/// | [`get_by_slug`](Store::get_by_slug) | Lookup by slug, optionally scoped to a knowledgebase |
/// | [`get_by_canonical_id`](Store::get_by_canonical_id) | Lookup by canonical id |
/// | [`resolve_by_filename`](Store::resolve_by_filename) | Permissive link resolution |
/// | [`knowledgebases`](Store::knowledgebases) / [`topics`](Store::topics) | Corpus summaries |
/// | `*_project*` | The separate project-brief store |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or fully replace the record with the same `canonical_id`,
    /// refreshing its search index entry in the same step.
    async fn upsert(&self, record: &KnowledgeRecord) -> Result<UpsertOutcome>;

    /// Records matching `filters`, ordered by `sequence_number` ascending.
    async fn query(&self, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>>;

    /// Lexical match of `term` against title, body and tags, combined with
    /// `filters`. Same ordering as [`query`](Store::query).
    async fn search(&self, term: &str, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>>;

    async fn get_by_slug(
        &self,
        slug: &str,
        knowledgebase: Option<&str>,
    ) -> Result<Option<KnowledgeRecord>>;

    async fn get_by_canonical_id(&self, canonical_id: &str) -> Result<Option<KnowledgeRecord>>;

    /// Resolve a markdown link target through the filename ladder in
    /// [`resolve`](crate::resolve).
    async fn resolve_by_filename(
        &self,
        filename: &str,
        knowledgebase: Option<&str>,
    ) -> Result<Option<KnowledgeRecord>> {
        let filters = QueryFilters {
            knowledgebase: knowledgebase.map(str::to_string),
            ..QueryFilters::default()
        };
        let records = self.query(&filters).await?;
        Ok(resolve::resolve_filename(filename, &records).cloned())
    }

    /// Canonical id, then slug, then the filename ladder.
    async fn resolve_reference(
        &self,
        token: &str,
        knowledgebase: Option<&str>,
    ) -> Result<Option<KnowledgeRecord>> {
        if let Some(record) = self.get_by_canonical_id(token).await? {
            return Ok(Some(record));
        }
        if let Some(record) = self.get_by_slug(token, knowledgebase).await? {
            return Ok(Some(record));
        }
        self.resolve_by_filename(token, knowledgebase).await
    }

    /// Every record, in query order.
    async fn all_records(&self) -> Result<Vec<KnowledgeRecord>> {
        self.query(&QueryFilters::default()).await
    }

    /// Record and distinct-level counts per knowledgebase, sorted by name.
    async fn knowledgebases(&self) -> Result<Vec<KnowledgebaseSummary>> {
        Ok(summarize_knowledgebases(&self.all_records().await?))
    }

    /// Topics inside a knowledgebase, sorted by name.
    async fn topics(&self, knowledgebase: &str) -> Result<Vec<TopicSummary>> {
        let records = self
            .query(&QueryFilters::for_knowledgebase(knowledgebase))
            .await?;
        Ok(summarize_topics(&records, knowledgebase))
    }

    async fn upsert_project(&self, project: &ProjectRecord) -> Result<UpsertOutcome>;

    /// Projects ordered by level rank, then title.
    async fn list_projects(
        &self,
        topic: Option<&str>,
        level: Option<Level>,
    ) -> Result<Vec<ProjectRecord>>;

    async fn get_project(&self, slug: &str, topic: Option<&str>)
        -> Result<Option<ProjectRecord>>;

    /// Project counts per topic, sorted by topic name.
    async fn project_topics(&self) -> Result<Vec<ProjectTopicSummary>> {
        let projects = self.list_projects(None, None).await?;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for p in &projects {
            *counts.entry(p.topic.clone()).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(name, project_count)| ProjectTopicSummary {
                display_name: crate::models::topic_display_name(&name),
                name,
                project_count,
            })
            .collect())
    }
}

pub fn summarize_knowledgebases(records: &[KnowledgeRecord]) -> Vec<KnowledgebaseSummary> {
    let mut by_kb: BTreeMap<&str, (i64, BTreeSet<Level>)> = BTreeMap::new();
    for r in records {
        let entry = by_kb.entry(r.knowledgebase.as_str()).or_default();
        entry.0 += 1;
        entry.1.insert(r.level);
    }
    by_kb
        .into_iter()
        .map(|(name, (file_count, levels))| KnowledgebaseSummary {
            name: name.to_string(),
            file_count,
            level_count: levels.len() as i64,
        })
        .collect()
}

/// Group records of one knowledgebase by the path segment after the
/// knowledgebase segment. Level folders and bare files contribute no topic.
pub fn summarize_topics(records: &[KnowledgeRecord], knowledgebase: &str) -> Vec<TopicSummary> {
    let mut by_topic: BTreeMap<String, (i64, BTreeSet<Level>)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.knowledgebase == knowledgebase) {
        if let Some(topic) = r.topic() {
            let entry = by_topic.entry(topic).or_default();
            entry.0 += 1;
            entry.1.insert(r.level);
        }
    }
    by_topic
        .into_iter()
        .map(|(name, (file_count, levels))| TopicSummary {
            name,
            file_count,
            level_count: levels.len() as i64,
        })
        .collect()
}

/// Order projects the way listings show them: level rank, then title.
pub fn sort_projects(projects: &mut [ProjectRecord]) {
    projects.sort_by(|a, b| {
        a.level
            .rank()
            .cmp(&b.level.rank())
            .then_with(|| a.title.cmp(&b.title))
    });
}
