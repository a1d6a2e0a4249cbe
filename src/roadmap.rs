//! `kb roadmap`: build the prerequisite graph for a knowledgebase.
//!
//! With `--output` the graph is written as JSON; otherwise a readable
//! listing goes to stdout.

use anyhow::{Context, Result};
use std::path::Path;

use knowledge_harness_core::models::Roadmap;
use knowledge_harness_core::roadmap::query_roadmap;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

pub fn write_roadmap(roadmap: &Roadmap, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(roadmap)?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write roadmap: {}", output.display()))?;
    Ok(())
}

fn print_roadmap(roadmap: &Roadmap) {
    match roadmap.topic {
        Some(ref topic) => println!("roadmap {} / {}", roadmap.knowledgebase, topic),
        None => println!("roadmap {}", roadmap.knowledgebase),
    }
    println!("  nodes: {}", roadmap.nodes.len());
    println!("  edges: {}", roadmap.edges.len());
    println!();

    for node in &roadmap.nodes {
        let incoming: Vec<&str> = roadmap
            .edges
            .iter()
            .filter(|e| e.target == node.id)
            .map(|e| e.source.as_str())
            .collect();
        if incoming.is_empty() {
            println!("  [{:<12}] {}", node.level.as_str(), node.title);
        } else {
            println!(
                "  [{:<12}] {}  <- {}",
                node.level.as_str(),
                node.title,
                incoming.join(", ")
            );
        }
    }
}

pub async fn run_roadmap(
    config: &Config,
    knowledgebase: &str,
    topic: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let roadmap = query_roadmap(&store, knowledgebase, topic).await;
    store.close().await;
    let roadmap = roadmap?;

    match output {
        Some(path) => {
            write_roadmap(&roadmap, path)?;
            println!(
                "roadmap {}: {} nodes, {} edges -> {}",
                knowledgebase,
                roadmap.nodes.len(),
                roadmap.edges.len(),
                path.display()
            );
        }
        None => print_roadmap(&roadmap),
    }
    Ok(())
}
