//! In-memory [`Store`] implementation for tests and dry runs.
//!
//! Uses `HashMap` behind `std::sync::RwLock` for thread safety. Search is a
//! case-insensitive token scan over title, body and tags; every token must
//! occur somewhere in the record.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{KnowledgeRecord, Level, ProjectRecord, QueryFilters};

use super::{sort_projects, Store, UpsertOutcome};

/// In-memory store keyed by canonical id.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, KnowledgeRecord>>,
    projects: RwLock<HashMap<String, ProjectRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = KnowledgeRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.write() {
            for r in records {
                map.insert(r.canonical_id.clone(), r);
            }
        }
        store
    }

    fn read_records(&self) -> Result<RwLockReadGuard<'_, HashMap<String, KnowledgeRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow!("record store lock poisoned"))
    }

    fn write_records(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, KnowledgeRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow!("record store lock poisoned"))
    }

    fn read_projects(&self) -> Result<RwLockReadGuard<'_, HashMap<String, ProjectRecord>>> {
        self.projects
            .read()
            .map_err(|_| anyhow!("project store lock poisoned"))
    }

    fn filtered(&self, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>> {
        let records = self.read_records()?;
        let mut out: Vec<KnowledgeRecord> = records
            .values()
            .filter(|r| filters.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.sequence_number
                .cmp(&b.sequence_number)
                .then_with(|| a.canonical_id.cmp(&b.canonical_id))
        });
        Ok(out)
    }
}

fn matches_terms(record: &KnowledgeRecord, terms: &[String]) -> bool {
    let title = record.title.to_lowercase();
    let body = record.body.to_lowercase();
    terms.iter().all(|t| {
        title.contains(t.as_str())
            || body.contains(t.as_str())
            || record.tags.iter().any(|tag| tag.to_lowercase().contains(t.as_str()))
    })
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert(&self, record: &KnowledgeRecord) -> Result<UpsertOutcome> {
        let mut records = self.write_records()?;
        let outcome = match records.get(&record.canonical_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing == record => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };
        records.insert(record.canonical_id.clone(), record.clone());
        Ok(outcome)
    }

    async fn query(&self, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>> {
        self.filtered(filters)
    }

    async fn search(&self, term: &str, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>> {
        let terms: Vec<String> = term.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .filtered(filters)?
            .into_iter()
            .filter(|r| matches_terms(r, &terms))
            .collect())
    }

    async fn get_by_slug(
        &self,
        slug: &str,
        knowledgebase: Option<&str>,
    ) -> Result<Option<KnowledgeRecord>> {
        let records = self.read_records()?;
        let mut hits: Vec<&KnowledgeRecord> = records
            .values()
            .filter(|r| r.slug == slug)
            .filter(|r| knowledgebase.map_or(true, |kb| r.knowledgebase == kb))
            .collect();
        hits.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));
        Ok(hits.first().map(|r| (*r).clone()))
    }

    async fn get_by_canonical_id(&self, canonical_id: &str) -> Result<Option<KnowledgeRecord>> {
        Ok(self.read_records()?.get(canonical_id).cloned())
    }

    async fn upsert_project(&self, project: &ProjectRecord) -> Result<UpsertOutcome> {
        let mut projects = self
            .projects
            .write()
            .map_err(|_| anyhow!("project store lock poisoned"))?;
        let outcome = match projects.get(&project.canonical_id) {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing == project => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        };
        projects.insert(project.canonical_id.clone(), project.clone());
        Ok(outcome)
    }

    async fn list_projects(
        &self,
        topic: Option<&str>,
        level: Option<Level>,
    ) -> Result<Vec<ProjectRecord>> {
        let projects = self.read_projects()?;
        let mut out: Vec<ProjectRecord> = projects
            .values()
            .filter(|p| topic.map_or(true, |t| p.topic == t))
            .filter(|p| level.map_or(true, |l| p.level == l))
            .cloned()
            .collect();
        sort_projects(&mut out);
        Ok(out)
    }

    async fn get_project(
        &self,
        slug: &str,
        topic: Option<&str>,
    ) -> Result<Option<ProjectRecord>> {
        let projects = self.read_projects()?;
        let mut hits: Vec<&ProjectRecord> = projects
            .values()
            .filter(|p| p.slug == slug)
            .filter(|p| topic.map_or(true, |t| p.topic == t))
            .collect();
        hits.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));
        Ok(hits.first().map(|p| (*p).clone()))
    }
}
