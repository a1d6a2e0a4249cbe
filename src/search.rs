//! `kb search` and `kb list`.

use anyhow::Result;

use knowledge_harness_core::models::{KnowledgeRecord, QueryFilters};
use knowledge_harness_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Print records as a table, or as a JSON array with `json`.
pub fn print_records(records: &[KnowledgeRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "{:<24} {:<16} {:<14} {:>4}  TITLE",
        "ID", "KNOWLEDGEBASE", "LEVEL", "NUM"
    );
    println!("{}", "-".repeat(88));
    for r in records {
        println!(
            "{:<24} {:<16} {:<14} {:>4}  {}",
            r.canonical_id,
            r.knowledgebase,
            r.level.as_str(),
            r.sequence_number,
            r.title
        );
    }
    println!();
    println!(
        "{} result{}",
        records.len(),
        if records.len() == 1 { "" } else { "s" }
    );
    Ok(())
}

pub async fn run_search(
    config: &Config,
    term: &str,
    filters: &QueryFilters,
    json: bool,
) -> Result<()> {
    if term.trim().is_empty() {
        return print_records(&[], json);
    }

    let store = SqliteStore::open(config).await?;
    let records = store.search(term, filters).await;
    store.close().await;

    print_records(&records?, json)
}

pub async fn run_list(config: &Config, filters: &QueryFilters, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = store.query(filters).await;
    store.close().await;

    print_records(&records?, json)
}
