//! Database statistics: `kb stats` and `kb topics`.

use anyhow::Result;

use knowledge_harness_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let counts = store.counts().await;
    let knowledgebases = store.knowledgebases().await;
    store.close().await;
    let counts = counts?;
    let knowledgebases = knowledgebases?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Knowledge Harness: Database Stats");
    println!("=================================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", counts.records);
    println!("  Indexed:     {}", counts.indexed);
    println!("  Projects:    {}", counts.projects);
    println!(
        "  Updated:     {}",
        counts
            .last_updated
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !knowledgebases.is_empty() {
        println!();
        println!("  By knowledgebase:");
        println!("  {:<24} {:>6} {:>7}", "KNOWLEDGEBASE", "DOCS", "LEVELS");
        println!("  {}", "-".repeat(40));
        for kb in &knowledgebases {
            println!("  {:<24} {:>6} {:>7}", kb.name, kb.file_count, kb.level_count);
        }
    }

    println!();
    Ok(())
}

pub async fn run_topics(config: &Config, knowledgebase: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let topics = store.topics(knowledgebase).await;
    store.close().await;
    let topics = topics?;

    if topics.is_empty() {
        println!("No topics in {}.", knowledgebase);
        return Ok(());
    }
    println!("{:<24} {:>6} {:>7}", "TOPIC", "DOCS", "LEVELS");
    for t in &topics {
        println!("{:<24} {:>6} {:>7}", t.name, t.file_count, t.level_count);
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now, e.g. "3 hours ago".
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
