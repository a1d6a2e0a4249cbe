//! Bulk reindex of one or more corpora.
//!
//! Each corpus is scanned, then every parsed record is upserted by canonical
//! id. A file that fails to parse, or a record that fails to write, is
//! logged and counted; the rest of the corpus still lands. Re-running on an
//! unchanged corpus leaves every record `unchanged`.

use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

use knowledge_harness_core::store::{Store, UpsertOutcome};

use crate::config::{Config, ScannerConfig};
use crate::progress::{ProgressMode, ProgressReporter, ReindexEvent};
use crate::scanner;
use crate::sqlite_store::SqliteStore;

/// Emit a `Writing` event every this many records.
const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexReport {
    pub knowledgebase: String,
    pub dry_run: bool,
    /// Document files found.
    pub scanned: usize,
    pub parsed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Parse failures plus write failures.
    pub failed: usize,
    /// Records sharing a slug with a different canonical id in this corpus.
    pub slug_collisions: usize,
}

/// Scan `root` and upsert everything it yields into `store`.
///
/// With `dry_run` the corpus is parsed and counted but nothing is written.
pub async fn reindex<S: Store + ?Sized>(
    store: &S,
    root: &Path,
    scanner_config: &ScannerConfig,
    dry_run: bool,
    progress: &dyn ProgressReporter,
) -> Result<ReindexReport> {
    let knowledgebase = scanner::knowledgebase_name(root)?;
    progress.report(ReindexEvent::Scanning {
        knowledgebase: knowledgebase.clone(),
    });

    let outcome = scanner::scan_corpus(root, scanner_config)?;
    let mut report = ReindexReport {
        knowledgebase: outcome.knowledgebase.clone(),
        dry_run,
        scanned: outcome.records.len() + outcome.failures.len(),
        parsed: outcome.records.len(),
        failed: outcome.failures.len(),
        ..ReindexReport::default()
    };

    // Bulk reindex resolves slug clashes by upsert; they are only reported.
    let mut slugs: HashMap<&str, &str> = HashMap::new();
    for record in &outcome.records {
        match slugs.get(record.slug.as_str()) {
            Some(other) if *other != record.canonical_id => {
                tracing::warn!(
                    knowledgebase = %record.knowledgebase,
                    slug = %record.slug,
                    first = %other,
                    second = %record.canonical_id,
                    "slug used by more than one document"
                );
                report.slug_collisions += 1;
            }
            Some(_) => {}
            None => {
                slugs.insert(&record.slug, &record.canonical_id);
            }
        }
    }

    if dry_run {
        return Ok(report);
    }

    let total = outcome.records.len();
    for (i, record) in outcome.records.iter().enumerate() {
        match store.upsert(record).await {
            Ok(UpsertOutcome::Inserted) => report.inserted += 1,
            Ok(UpsertOutcome::Updated) => report.updated += 1,
            Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
            Err(err) => {
                tracing::warn!(
                    path = %record.source_path,
                    canonical_id = %record.canonical_id,
                    error = %err,
                    "failed to store document"
                );
                report.failed += 1;
            }
        }

        let n = i + 1;
        if n % PROGRESS_EVERY == 0 || n == total {
            progress.report(ReindexEvent::Writing {
                knowledgebase: report.knowledgebase.clone(),
                n: n as u64,
                total: total as u64,
            });
        }
    }

    tracing::info!(
        knowledgebase = %report.knowledgebase,
        inserted = report.inserted,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failed,
        "reindex finished"
    );
    Ok(report)
}

/// `kb reindex`: every corpus runs as its own task against a shared store.
pub async fn run_reindex(
    config: &Config,
    paths: &[PathBuf],
    dry_run: bool,
    mode: ProgressMode,
) -> Result<()> {
    if paths.is_empty() {
        bail!("No corpus paths given");
    }

    let store = SqliteStore::open(config).await?;
    let reporter: Arc<dyn ProgressReporter> = Arc::from(mode.reporter());

    let mut tasks = JoinSet::new();
    for path in paths {
        let store = store.clone();
        let reporter = Arc::clone(&reporter);
        let scanner_config = config.scanner.clone();
        let path = path.clone();
        tasks.spawn(async move {
            let result = reindex(&store, &path, &scanner_config, dry_run, reporter.as_ref()).await;
            (path, result)
        });
    }

    let mut reports = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (path, result) = joined?;
        match result {
            Ok(report) => reports.push(report),
            Err(err) => errors.push(format!("{}: {:#}", path.display(), err)),
        }
    }
    reports.sort_by(|a, b| a.knowledgebase.cmp(&b.knowledgebase));

    for report in &reports {
        print_report(report);
    }

    store.close().await;

    if !errors.is_empty() {
        bail!("reindex failed for {} corpus path(s):\n  {}", errors.len(), errors.join("\n  "));
    }
    println!("ok");
    Ok(())
}

fn print_report(report: &ReindexReport) {
    if report.dry_run {
        println!("reindex {} (dry-run)", report.knowledgebase);
        println!("  files found: {}", report.scanned);
        println!("  parseable: {}", report.parsed);
        println!("  failed: {}", report.failed);
    } else {
        println!("reindex {}", report.knowledgebase);
        println!("  scanned: {} files", report.scanned);
        println!("  inserted: {}", report.inserted);
        println!("  updated: {}", report.updated);
        println!("  unchanged: {}", report.unchanged);
        println!("  failed: {}", report.failed);
    }
    if report.slug_collisions > 0 {
        println!("  slug collisions: {}", report.slug_collisions);
    }
}
