use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Safe to run against an existing database.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create knowledge_files table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_id TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            level TEXT NOT NULL,
            number INTEGER NOT NULL DEFAULT 0,
            file_path TEXT NOT NULL,
            knowledgebase TEXT NOT NULL,
            tags TEXT NOT NULL DEFAULT '[]',
            prerequisites TEXT NOT NULL DEFAULT '[]',
            estimated_minutes INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create projects table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_id TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            level TEXT NOT NULL,
            topic TEXT NOT NULL,
            requirements_markdown TEXT NOT NULL DEFAULT '',
            topics_covered TEXT NOT NULL DEFAULT '[]',
            estimated_hours INTEGER NOT NULL DEFAULT 0,
            challenges TEXT NOT NULL DEFAULT '[]',
            prerequisites TEXT NOT NULL DEFAULT '[]',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='knowledge_files_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE knowledge_files_fts USING fts5(
                file_id UNINDEXED,
                title,
                content,
                tags
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_files_kb_level ON knowledge_files(knowledgebase, level)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_knowledge_files_slug ON knowledge_files(slug, knowledgebase)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_topic ON projects(topic)")
        .execute(pool)
        .await?;

    Ok(())
}
