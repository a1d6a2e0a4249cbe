//! Single-record lookups: `kb get` and `kb resolve`.

use anyhow::{bail, Result};

use knowledge_harness_core::models::KnowledgeRecord;
use knowledge_harness_core::store::Store;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// How `kb get` should find the record.
#[derive(Debug, Clone)]
pub enum Lookup {
    CanonicalId(String),
    Slug {
        slug: String,
        knowledgebase: Option<String>,
    },
}

pub async fn get_record<S: Store + ?Sized>(
    store: &S,
    lookup: &Lookup,
) -> Result<Option<KnowledgeRecord>> {
    match lookup {
        Lookup::CanonicalId(id) => store.get_by_canonical_id(id).await,
        Lookup::Slug {
            slug,
            knowledgebase,
        } => store.get_by_slug(slug, knowledgebase.as_deref()).await,
    }
}

fn print_record(record: &KnowledgeRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:            {}", record.canonical_id);
    println!("slug:          {}", record.slug);
    println!("title:         {}", record.title);
    println!("knowledgebase: {}", record.knowledgebase);
    if let Some(topic) = record.topic() {
        println!("topic:         {}", topic);
    }
    println!("level:         {}", record.level);
    println!("number:        {}", record.sequence_number);
    println!("path:          {}", record.source_path);
    println!("minutes:       {}", record.estimated_minutes);
    if !record.tags.is_empty() {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        println!("tags:          {}", tags.join(", "));
    }
    if !record.prerequisites.is_empty() {
        println!("prerequisites: {}", record.prerequisites.join(", "));
    }
    println!();
    println!("--- Content ---");
    println!("{}", record.body);
    Ok(())
}

pub async fn run_get(config: &Config, lookup: &Lookup, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let found = get_record(&store, lookup).await;
    store.close().await;

    match found? {
        Some(record) => print_record(&record, json),
        None => match lookup {
            Lookup::CanonicalId(id) => bail!("document not found: {}", id),
            Lookup::Slug { slug, .. } => bail!("document not found: {}", slug),
        },
    }
}

/// `kb resolve`: canonical id, then slug, then the filename ladder.
pub async fn run_resolve(
    config: &Config,
    reference: &str,
    knowledgebase: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let found = store.resolve_reference(reference, knowledgebase).await;
    store.close().await;

    let Some(record) = found? else {
        bail!("no document matches: {}", reference);
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "canonical_id": record.canonical_id,
                "slug": record.slug,
                "knowledgebase": record.knowledgebase,
                "title": record.title,
            }))?
        );
    } else {
        println!("{}/{}  {}", record.knowledgebase, record.slug, record.canonical_id);
    }
    Ok(())
}
