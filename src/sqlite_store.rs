//! SQLite-backed [`Store`] implementation.
//!
//! Records live in `knowledge_files`, with a companion FTS5 table
//! `knowledge_files_fts` keyed by the row id. Project briefs live in
//! `projects`, challenges serialized as JSON. Rows are decoded into typed
//! records right here; nothing above this module sees a raw row.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use knowledge_harness_core::models::{
    KnowledgeRecord, KnowledgebaseSummary, Level, ProjectRecord, QueryFilters,
};
use knowledge_harness_core::store::{sort_projects, Store, UpsertOutcome};

use crate::config::Config;
use crate::{db, migrate};

const RECORD_COLUMNS: &str = "knowledge_files.canonical_id, knowledge_files.slug, \
    knowledge_files.title, knowledge_files.level, knowledge_files.number, \
    knowledge_files.file_path, knowledge_files.knowledgebase, knowledge_files.tags, \
    knowledge_files.prerequisites, knowledge_files.estimated_minutes, knowledge_files.content";

const PROJECT_COLUMNS: &str = "canonical_id, slug, title, description, level, topic, \
    requirements_markdown, topics_covered, estimated_hours, challenges, prerequisites";

/// SQLite implementation of the [`Store`] trait.
///
/// Cloning is cheap and shares the underlying pool, so one store can be
/// handed to several concurrent reindex tasks.
///
/// Writers take `write_lock` for the whole transaction. SQLite allows one
/// writer at a time, and a deferred transaction that read before another
/// writer committed cannot upgrade to a write lock at all, so upserts from
/// concurrent tasks are queued here instead of failing with `SQLITE_BUSY`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

/// Row counts for `kb stats`.
#[derive(Debug, Clone, Default)]
pub struct StoreCounts {
    pub records: i64,
    pub indexed: i64,
    pub projects: i64,
    pub last_updated: Option<i64>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Connect and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn counts(&self) -> Result<StoreCounts> {
        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_files")
            .fetch_one(&self.pool)
            .await?;
        let indexed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_files_fts")
            .fetch_one(&self.pool)
            .await?;
        let projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;
        let last_updated: Option<i64> =
            sqlx::query_scalar("SELECT MAX(updated_at) FROM knowledge_files")
                .fetch_one(&self.pool)
                .await?;

        Ok(StoreCounts {
            records,
            indexed,
            projects,
            last_updated,
        })
    }
}

/// SHA-256 over the serialized record. Any field change yields a new hash.
pub fn record_hash(record: &KnowledgeRecord) -> Result<String> {
    let serialized = serde_json::to_vec(record)?;
    let mut hasher = Sha256::new();
    hasher.update(&serialized);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Turn free text into an FTS5 query where every token is a quoted string.
///
/// Tokens are implicitly AND-ed. Returns `None` when nothing is left to match.
pub fn fts_query(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// WHERE fragments plus their bind values, in order.
fn filter_clauses(filters: &QueryFilters) -> (Vec<String>, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();

    if let Some(level) = filters.level {
        clauses.push("knowledge_files.level = ?".to_string());
        binds.push(level.as_str().to_string());
    }
    if let Some(ref kb) = filters.knowledgebase {
        clauses.push("knowledge_files.knowledgebase = ?".to_string());
        binds.push(kb.clone());
    }
    // `instr` is a case-sensitive byte match, like `QueryFilters::matches`.
    if let Some(segment) = filters.topic_segment() {
        clauses.push("instr(knowledge_files.file_path, ?) > 0".to_string());
        binds.push(segment);
    }
    if !filters.tags.is_empty() {
        let placeholders = vec!["?"; filters.tags.len()].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(knowledge_files.tags) WHERE json_each.value IN ({}))",
            placeholders
        ));
        binds.extend(filters.tags.iter().cloned());
    }

    (clauses, binds)
}

fn decode_level(raw: &str) -> Result<Level> {
    raw.parse::<Level>()
        .map_err(|e| anyhow!("corrupt level column: {}", e))
}

fn record_from_row(row: &SqliteRow) -> Result<KnowledgeRecord> {
    let canonical_id: String = row.get("canonical_id");
    let tags_json: String = row.get("tags");
    let prerequisites_json: String = row.get("prerequisites");

    let tags: BTreeSet<String> = serde_json::from_str(&tags_json)
        .with_context(|| format!("corrupt tags for {}", canonical_id))?;
    let prerequisites: Vec<String> = serde_json::from_str(&prerequisites_json)
        .with_context(|| format!("corrupt prerequisites for {}", canonical_id))?;
    let level: String = row.get("level");

    Ok(KnowledgeRecord {
        slug: row.get("slug"),
        title: row.get("title"),
        level: decode_level(&level)?,
        sequence_number: row.get("number"),
        source_path: row.get("file_path"),
        knowledgebase: row.get("knowledgebase"),
        tags,
        prerequisites,
        estimated_minutes: row.get("estimated_minutes"),
        body: row.get("content"),
        canonical_id,
    })
}

fn project_from_row(row: &SqliteRow) -> Result<ProjectRecord> {
    let canonical_id: String = row.get("canonical_id");
    let level: String = row.get("level");
    let topics_covered: String = row.get("topics_covered");
    let challenges: String = row.get("challenges");
    let prerequisites: String = row.get("prerequisites");

    Ok(ProjectRecord {
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        level: decode_level(&level)?,
        topic: row.get("topic"),
        requirements_markdown: row.get("requirements_markdown"),
        topics_covered: serde_json::from_str(&topics_covered)
            .with_context(|| format!("corrupt topics_covered for {}", canonical_id))?,
        estimated_hours: row.get("estimated_hours"),
        challenges: serde_json::from_str(&challenges)
            .with_context(|| format!("corrupt challenges for {}", canonical_id))?,
        prerequisites: serde_json::from_str(&prerequisites)
            .with_context(|| format!("corrupt prerequisites for {}", canonical_id))?,
        canonical_id,
    })
}

impl SqliteStore {
    async fn fetch_records(&self, sql: &str, binds: &[String]) -> Result<Vec<KnowledgeRecord>> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = query.bind(value.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert(&self, record: &KnowledgeRecord) -> Result<UpsertOutcome> {
        let hash = record_hash(record)?;
        let now = chrono::Utc::now().timestamp();
        let tags_json = serde_json::to_string(&record.tags)?;
        let prerequisites_json = serde_json::to_string(&record.prerequisites)?;

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT content_hash FROM knowledge_files WHERE canonical_id = ?")
                .bind(&record.canonical_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            Some(ref stored) if *stored == hash => {
                tx.rollback().await?;
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        sqlx::query(
            r#"
            INSERT INTO knowledge_files (canonical_id, slug, title, level, number, file_path,
                                         knowledgebase, tags, prerequisites, estimated_minutes,
                                         content, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(canonical_id) DO UPDATE SET
                slug = excluded.slug,
                title = excluded.title,
                level = excluded.level,
                number = excluded.number,
                file_path = excluded.file_path,
                knowledgebase = excluded.knowledgebase,
                tags = excluded.tags,
                prerequisites = excluded.prerequisites,
                estimated_minutes = excluded.estimated_minutes,
                content = excluded.content,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.canonical_id)
        .bind(&record.slug)
        .bind(&record.title)
        .bind(record.level.as_str())
        .bind(record.sequence_number)
        .bind(&record.source_path)
        .bind(&record.knowledgebase)
        .bind(&tags_json)
        .bind(&prerequisites_json)
        .bind(record.estimated_minutes)
        .bind(&record.body)
        .bind(&hash)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // The FTS entry is keyed by row id, which only exists after the write.
        let file_id: i64 =
            sqlx::query_scalar("SELECT id FROM knowledge_files WHERE canonical_id = ?")
                .bind(&record.canonical_id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM knowledge_files_fts WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        let fts_tags = record.tags.iter().cloned().collect::<Vec<_>>().join(" ");
        sqlx::query(
            "INSERT INTO knowledge_files_fts (file_id, title, content, tags) VALUES (?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(&record.title)
        .bind(&record.body)
        .bind(&fts_tags)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn query(&self, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>> {
        let (clauses, binds) = filter_clauses(filters);
        let mut sql = format!("SELECT {} FROM knowledge_files", RECORD_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY knowledge_files.number ASC, knowledge_files.canonical_id ASC");

        self.fetch_records(&sql, &binds).await
    }

    async fn search(&self, term: &str, filters: &QueryFilters) -> Result<Vec<KnowledgeRecord>> {
        let Some(match_expr) = fts_query(term) else {
            return Ok(Vec::new());
        };

        let (clauses, filter_binds) = filter_clauses(filters);
        let mut sql = format!(
            "SELECT {} FROM knowledge_files \
             JOIN knowledge_files_fts ON knowledge_files_fts.file_id = knowledge_files.id \
             WHERE knowledge_files_fts MATCH ?",
            RECORD_COLUMNS
        );
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY knowledge_files.number ASC, knowledge_files.canonical_id ASC");

        let mut binds = Vec::with_capacity(filter_binds.len() + 1);
        binds.push(match_expr);
        binds.extend(filter_binds);

        self.fetch_records(&sql, &binds).await
    }

    async fn get_by_slug(
        &self,
        slug: &str,
        knowledgebase: Option<&str>,
    ) -> Result<Option<KnowledgeRecord>> {
        let mut sql = format!(
            "SELECT {} FROM knowledge_files WHERE knowledge_files.slug = ?",
            RECORD_COLUMNS
        );
        let mut binds = vec![slug.to_string()];
        if let Some(kb) = knowledgebase {
            sql.push_str(" AND knowledge_files.knowledgebase = ?");
            binds.push(kb.to_string());
        }
        sql.push_str(
            " ORDER BY knowledge_files.knowledgebase ASC, knowledge_files.number ASC LIMIT 1",
        );

        Ok(self.fetch_records(&sql, &binds).await?.into_iter().next())
    }

    async fn get_by_canonical_id(&self, canonical_id: &str) -> Result<Option<KnowledgeRecord>> {
        let sql = format!(
            "SELECT {} FROM knowledge_files WHERE knowledge_files.canonical_id = ?",
            RECORD_COLUMNS
        );
        Ok(self
            .fetch_records(&sql, &[canonical_id.to_string()])
            .await?
            .into_iter()
            .next())
    }

    async fn knowledgebases(&self) -> Result<Vec<KnowledgebaseSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT knowledgebase,
                   COUNT(*) AS file_count,
                   COUNT(DISTINCT level) AS level_count
            FROM knowledge_files
            GROUP BY knowledgebase
            ORDER BY knowledgebase ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| KnowledgebaseSummary {
                name: row.get("knowledgebase"),
                file_count: row.get("file_count"),
                level_count: row.get("level_count"),
            })
            .collect())
    }

    async fn upsert_project(&self, project: &ProjectRecord) -> Result<UpsertOutcome> {
        let now = chrono::Utc::now().timestamp();
        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!(
            "SELECT {} FROM projects WHERE canonical_id = ?",
            PROJECT_COLUMNS
        ))
        .bind(&project.canonical_id)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some(ref row) if project_from_row(row).ok().as_ref() == Some(project) => {
                tx.rollback().await?;
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        sqlx::query(
            r#"
            INSERT INTO projects (canonical_id, slug, title, description, level, topic,
                                  requirements_markdown, topics_covered, estimated_hours,
                                  challenges, prerequisites, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(canonical_id) DO UPDATE SET
                slug = excluded.slug,
                title = excluded.title,
                description = excluded.description,
                level = excluded.level,
                topic = excluded.topic,
                requirements_markdown = excluded.requirements_markdown,
                topics_covered = excluded.topics_covered,
                estimated_hours = excluded.estimated_hours,
                challenges = excluded.challenges,
                prerequisites = excluded.prerequisites,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&project.canonical_id)
        .bind(&project.slug)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.level.as_str())
        .bind(&project.topic)
        .bind(&project.requirements_markdown)
        .bind(serde_json::to_string(&project.topics_covered)?)
        .bind(project.estimated_hours)
        .bind(serde_json::to_string(&project.challenges)?)
        .bind(serde_json::to_string(&project.prerequisites)?)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    async fn list_projects(
        &self,
        topic: Option<&str>,
        level: Option<Level>,
    ) -> Result<Vec<ProjectRecord>> {
        let mut sql = format!("SELECT {} FROM projects WHERE 1 = 1", PROJECT_COLUMNS);
        if topic.is_some() {
            sql.push_str(" AND topic = ?");
        }
        if level.is_some() {
            sql.push_str(" AND level = ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(t) = topic {
            query = query.bind(t);
        }
        if let Some(l) = level {
            query = query.bind(l.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut projects = rows
            .iter()
            .map(project_from_row)
            .collect::<Result<Vec<_>>>()?;
        // Level order is by rank, not by the stored text.
        sort_projects(&mut projects);
        Ok(projects)
    }

    async fn get_project(
        &self,
        slug: &str,
        topic: Option<&str>,
    ) -> Result<Option<ProjectRecord>> {
        let mut sql = format!("SELECT {} FROM projects WHERE slug = ?", PROJECT_COLUMNS);
        if topic.is_some() {
            sql.push_str(" AND topic = ?");
        }
        sql.push_str(" ORDER BY id ASC LIMIT 1");

        let mut query = sqlx::query(&sql).bind(slug);
        if let Some(t) = topic {
            query = query.bind(t);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(project_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
