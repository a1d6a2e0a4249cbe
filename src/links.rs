//! `kb links`: report document links whose target file is gone.
//!
//! A link that no longer points at a file on disk is looked up in the index
//! through the same ladder as `kb resolve`. If the index knows the document
//! under another name the link is stale and the current path is suggested;
//! if nothing matches the link is broken.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use knowledge_harness_core::models::KnowledgeRecord;
use knowledge_harness_core::resolve::{document_links, DocumentLink, FileQuery};
use knowledge_harness_core::store::Store;

use crate::config::Config;
use crate::scanner;
use crate::sqlite_store::SqliteStore;

/// What became of one link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkStatus {
    /// The target file exists.
    Present,
    /// The file is gone but the index resolves the name to this record.
    Stale(KnowledgeRecord),
    Broken,
}

/// A link that does not point at an existing file.
#[derive(Debug, Clone)]
pub struct LinkIssue {
    pub source_path: String,
    pub link: DocumentLink,
    pub status: LinkStatus,
}

/// Totals for one corpus.
#[derive(Debug, Default)]
pub struct LinkReport {
    pub knowledgebase: String,
    pub documents: usize,
    pub links: usize,
    pub issues: Vec<LinkIssue>,
}

impl LinkReport {
    pub fn broken(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.status == LinkStatus::Broken)
            .count()
    }

    pub fn stale(&self) -> usize {
        self.issues.len() - self.broken()
    }
}

/// Where `link` points on disk. A leading `/` is relative to the corpus root.
pub fn link_destination(root: &Path, document: &Path, link: &DocumentLink) -> PathBuf {
    match link.decoded.strip_prefix('/') {
        Some(rooted) => root.join(rooted),
        None => document.parent().unwrap_or(root).join(&link.decoded),
    }
}

/// Absolute path of a scanned record; `source_path` starts with the
/// knowledgebase directory.
fn document_path(root: &Path, record: &KnowledgeRecord) -> PathBuf {
    let relative = record
        .source_path
        .strip_prefix(&format!("{}/", record.knowledgebase))
        .unwrap_or(&record.source_path);
    root.join(relative)
}

async fn link_status<S: Store + ?Sized>(
    store: &S,
    root: &Path,
    record: &KnowledgeRecord,
    link: &DocumentLink,
) -> Result<LinkStatus> {
    if link_destination(root, &document_path(root, record), link).is_file() {
        return Ok(LinkStatus::Present);
    }
    if FileQuery::new(&link.target).name.is_empty() {
        return Ok(LinkStatus::Broken);
    }
    let found = store
        .resolve_reference(&link.target, Some(&record.knowledgebase))
        .await?;
    Ok(found.map_or(LinkStatus::Broken, LinkStatus::Stale))
}

/// Check every link in the corpus at `root` against the disk and `store`.
pub async fn check_links<S: Store + ?Sized>(
    store: &S,
    root: &Path,
    config: &Config,
) -> Result<LinkReport> {
    let outcome = scanner::scan_corpus(root, &config.scanner)?;
    let mut report = LinkReport {
        knowledgebase: outcome.knowledgebase,
        documents: outcome.records.len(),
        ..LinkReport::default()
    };

    for record in &outcome.records {
        for link in document_links(&record.body)? {
            report.links += 1;
            let status = link_status(store, root, record, &link).await?;
            if status == LinkStatus::Present {
                continue;
            }
            tracing::debug!(
                path = %record.source_path,
                target = %link.target,
                "link target missing"
            );
            report.issues.push(LinkIssue {
                source_path: record.source_path.clone(),
                link,
                status,
            });
        }
    }
    Ok(report)
}

pub async fn run_links(config: &Config, path: &Path, strict: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let report = check_links(&store, path, config).await;
    store.close().await;
    let report = report?;

    println!("links {}", report.knowledgebase);
    println!("  documents: {}", report.documents);
    println!("  links: {}", report.links);
    println!("  stale: {}", report.stale());
    println!("  broken: {}", report.broken());
    for issue in &report.issues {
        match &issue.status {
            LinkStatus::Stale(record) => println!(
                "    stale   {}:{}  {}  ->  {}",
                issue.source_path, issue.link.line, issue.link.target, record.source_path
            ),
            LinkStatus::Broken => println!(
                "    broken  {}:{}  {}",
                issue.source_path, issue.link.line, issue.link.target
            ),
            LinkStatus::Present => {}
        }
    }

    let failing = if strict {
        report.issues.len()
    } else {
        report.broken()
    };
    if failing > 0 {
        bail!("{} unresolved link(s)", failing);
    }
    println!("ok");
    Ok(())
}
