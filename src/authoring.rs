//! Authoring commands: `kb check`, `kb admit`, `kb dupes`.
//!
//! `check` reports key collisions and near-duplicates at the warning
//! threshold without writing. `admit` writes a new document only when it
//! collides with nothing and stays under the rejection threshold. `dupes`
//! scans a whole corpus on disk and fails when any suspicious pair exists.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

use knowledge_harness_core::duplicates::{
    admit, check_duplicate, find_duplicate_pairs, DuplicateKind,
};
use knowledge_harness_core::frontmatter::{parse_document, DocumentContext};
use knowledge_harness_core::models::{level_folder_name, normalize_level};
use knowledge_harness_core::similarity::SimilarMatch;
use knowledge_harness_core::store::{Store, UpsertOutcome};
use knowledge_harness_core::{KbError, KnowledgeRecord};

use crate::config::Config;
use crate::scanner;
use crate::sqlite_store::SqliteStore;

/// Parse a standalone document the way the scanner would have.
///
/// The knowledgebase is `knowledgebase` if given. Otherwise it is the one
/// ancestor directory whose name is in `known` (the knowledgebases already
/// in the store); no match, or more than one, is an error. Level folders
/// between the file and the knowledgebase directory supply the inherited
/// level, and any other folder there is a topic.
pub fn load_candidate(
    path: &Path,
    knowledgebase: Option<&str>,
    known: &[String],
) -> Result<KnowledgeRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve path: {}", path.display()))?;
    let file_name = absolute
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("Not a file: {}", path.display()))?;

    // Ancestor directory names, nearest first.
    let dirs: Vec<String> = absolute
        .ancestors()
        .skip(1)
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect();

    let (kb, kb_index) = match knowledgebase {
        Some(kb) => (kb.to_string(), dirs.iter().position(|d| d == kb)),
        None => {
            let matches: Vec<usize> = dirs
                .iter()
                .enumerate()
                .filter(|(_, d)| known.iter().any(|k| k == *d))
                .map(|(i, _)| i)
                .collect();
            match matches.as_slice() {
                [i] => (dirs[*i].clone(), Some(*i)),
                [] => bail!(
                    "No ancestor of {} is an indexed knowledgebase; pass --knowledgebase",
                    path.display()
                ),
                _ => bail!(
                    "{} sits under several indexed knowledgebases ({}); pass --knowledgebase",
                    path.display(),
                    matches
                        .iter()
                        .map(|i| dirs[*i].as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
        }
    };
    let depth = kb_index.unwrap_or_else(|| {
        dirs.iter()
            .take_while(|d| level_folder_name(d).is_some())
            .count()
    });
    let within = &dirs[..depth];

    let inherited_level = within
        .iter()
        .find_map(|d| level_folder_name(d))
        .map(normalize_level);

    let mut segments: Vec<&str> = vec![kb.as_str()];
    segments.extend(within.iter().rev().map(String::as_str));
    segments.push(&file_name);
    let source_path = segments.join("/");

    let record = parse_document(
        &content,
        &DocumentContext {
            source_path: &source_path,
            file_name: &file_name,
            knowledgebase: &kb,
            inherited_level: inherited_level.as_deref(),
        },
    )?;
    Ok(record)
}

async fn candidate_in_store(
    store: &SqliteStore,
    file: &Path,
    knowledgebase: Option<&str>,
) -> Result<KnowledgeRecord> {
    let known = match knowledgebase {
        Some(_) => Vec::new(),
        None => store
            .knowledgebases()
            .await?
            .into_iter()
            .map(|kb| kb.name)
            .collect(),
    };
    load_candidate(file, knowledgebase, &known)
}

fn print_matches(matches: &[SimilarMatch]) {
    for m in matches {
        println!(
            "    {:.2}  {:<24} {}",
            m.score, m.record.canonical_id, m.record.title
        );
    }
}

fn kind_label(kind: DuplicateKind) -> &'static str {
    match kind {
        DuplicateKind::CanonicalId => "canonical_id",
        DuplicateKind::Slug => "slug",
        DuplicateKind::Similarity => "similarity",
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub async fn run_check(
    config: &Config,
    file: &Path,
    knowledgebase: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let candidate = match candidate_in_store(&store, file, knowledgebase).await {
        Ok(candidate) => candidate,
        Err(err) => {
            store.close().await;
            return Err(err);
        }
    };
    let report = check_duplicate(&store, &candidate, config.similarity.warn_threshold).await;
    store.close().await;
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("check {}", candidate.canonical_id);
    println!("  duplicate canonical_id: {}", yes_no(report.duplicate_id));
    println!("  duplicate slug: {}", yes_no(report.duplicate_slug));
    println!(
        "  similar documents (>= {:.2}): {}",
        config.similarity.warn_threshold,
        report.similar.len()
    );
    print_matches(&report.similar);

    let blocking = report
        .similar
        .iter()
        .any(|m| m.score >= config.similarity.reject_threshold);
    if report.duplicate_id || report.duplicate_slug || blocking {
        println!("would be rejected");
    } else if report.is_clean() {
        println!("ok");
    } else {
        println!("review suggested");
    }
    Ok(())
}

pub async fn run_admit(config: &Config, file: &Path, knowledgebase: Option<&str>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let candidate = match candidate_in_store(&store, file, knowledgebase).await {
        Ok(candidate) => candidate,
        Err(err) => {
            store.close().await;
            return Err(err);
        }
    };
    let result = admit(&store, &candidate, config.similarity.reject_threshold).await;
    store.close().await;

    match result {
        Ok(outcome) => {
            let verb = match outcome {
                UpsertOutcome::Inserted => "inserted",
                UpsertOutcome::Updated => "updated",
                UpsertOutcome::Unchanged => "unchanged",
            };
            println!("admitted {} ({})", candidate.canonical_id, verb);
            Ok(())
        }
        Err(KbError::SimilarityRejection { threshold, matches }) => {
            println!("rejected {}", candidate.canonical_id);
            println!("  similar documents (>= {:.2}): {}", threshold, matches.len());
            print_matches(&matches);
            bail!(
                "similar content detected: {} existing document(s) at or above {:.2}",
                matches.len(),
                threshold
            )
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn run_dupes(config: &Config, path: &Path, threshold: Option<f64>) -> Result<()> {
    let threshold = threshold.unwrap_or(config.similarity.reject_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("--threshold must be in [0.0, 1.0], got {}", threshold);
    }

    let outcome = scanner::scan_corpus(path, &config.scanner)?;
    let pairs = find_duplicate_pairs(&outcome.records, threshold);

    println!("dupes {}", outcome.knowledgebase);
    println!("  documents: {}", outcome.records.len());
    println!("  unparseable: {}", outcome.failures.len());
    println!("  suspicious pairs: {}", pairs.len());
    for pair in &pairs {
        println!(
            "    {:<12} {:.2}  {}  <->  {}",
            kind_label(pair.kind),
            pair.score,
            pair.first.source_path,
            pair.second.source_path
        );
    }

    if !pairs.is_empty() {
        bail!("{} duplicate pair(s) found", pairs.len());
    }
    println!("ok");
    Ok(())
}
