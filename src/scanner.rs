//! Corpus scanner.
//!
//! Walks one corpus directory, tracks the level inherited from the nearest
//! `NN_levelname` folder, and hands every document file to the parser. The
//! corpus directory's own name is the knowledgebase. A file that cannot be
//! read or parsed is logged and reported, never fatal to its siblings.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use knowledge_harness_core::frontmatter::{parse_document, DocumentContext};
use knowledge_harness_core::models::{level_folder_name, normalize_level};
use knowledge_harness_core::{KbError, KnowledgeRecord};

use crate::config::ScannerConfig;

/// A document file found under a corpus root.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// `<knowledgebase>/<relative path>`, always `/`-separated.
    pub source_path: String,
    pub file_name: String,
    /// Normalized level of the nearest level folder above the file.
    pub inherited_level: Option<String>,
}

/// Everything one scan produced.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub knowledgebase: String,
    pub records: Vec<KnowledgeRecord>,
    pub failures: Vec<KbError>,
}

/// Name of the corpus directory, which becomes the records' knowledgebase.
pub fn knowledgebase_name(root: &Path) -> Result<String> {
    let canonical = root
        .canonicalize()
        .with_context(|| format!("Corpus root does not exist: {}", root.display()))?;
    match canonical.file_name() {
        Some(name) => Ok(name.to_string_lossy().to_string()),
        None => bail!("Corpus root has no directory name: {}", root.display()),
    }
}

/// Level named by the nearest level folder among `relative`'s parent directories.
pub fn inherited_level(relative: &Path) -> Option<String> {
    let parent = relative.parent()?;
    parent
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .filter_map(level_folder_name)
        .last()
        .map(normalize_level)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn exclude_set(config: &ScannerConfig) -> Result<GlobSet> {
    let mut patterns = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    patterns.extend(config.exclude_globs.clone());
    build_globset(&patterns)
}

/// List every document file under `root`, sorted by source path.
pub fn discover(root: &Path, config: &ScannerConfig) -> Result<Vec<ScannedFile>> {
    if !root.is_dir() {
        bail!("Corpus root is not a directory: {}", root.display());
    }
    let knowledgebase = knowledgebase_name(root)?;
    let excludes = exclude_set(config)?;
    let extension = config.extension.trim_start_matches('.');

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        // Apply exclude patterns
        if excludes.is_match(&rel_str) {
            continue;
        }

        files.push(ScannedFile {
            path: path.to_path_buf(),
            source_path: format!("{}/{}", knowledgebase, rel_str),
            file_name: entry.file_name().to_string_lossy().to_string(),
            inherited_level: inherited_level(relative),
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(files)
}

/// Read and parse one discovered file.
pub fn parse_file(file: &ScannedFile, knowledgebase: &str) -> Result<KnowledgeRecord, KbError> {
    let content = std::fs::read_to_string(&file.path)
        .map_err(|e| KbError::parse(file.source_path.clone(), e))?;
    parse_document(
        &content,
        &DocumentContext {
            source_path: &file.source_path,
            file_name: &file.file_name,
            knowledgebase,
            inherited_level: file.inherited_level.as_deref(),
        },
    )
}

/// Walk `root` and parse every document, isolating per-file failures.
pub fn scan_corpus(root: &Path, config: &ScannerConfig) -> Result<ScanOutcome> {
    let knowledgebase = knowledgebase_name(root)?;
    let files = discover(root, config)?;

    let mut outcome = ScanOutcome {
        knowledgebase: knowledgebase.clone(),
        ..ScanOutcome::default()
    };
    for file in &files {
        match parse_file(file, &knowledgebase) {
            Ok(record) => outcome.records.push(record),
            Err(err) => {
                tracing::warn!(path = %file.source_path, error = %err, "skipping document");
                outcome.failures.push(err);
            }
        }
    }

    tracing::debug!(
        knowledgebase = %knowledgebase,
        parsed = outcome.records.len(),
        failed = outcome.failures.len(),
        "scanned corpus"
    );
    Ok(outcome)
}
