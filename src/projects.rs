//! Project brief pipeline.
//!
//! Briefs live in their own corpus, laid out with the same `NN_level`
//! folder convention as guides. Each brief is parsed into a
//! [`ProjectRecord`] with its challenges and steps extracted, then upserted
//! into the separate project store.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use knowledge_harness_core::frontmatter::{fallback_id, parse_front_matter, resolve_level};
use knowledge_harness_core::models::{Level, ProjectRecord};
use knowledge_harness_core::steps::{
    extract_challenges, extract_requirements, GuideIdentity, GuideLookup,
};
use knowledge_harness_core::store::{Store, UpsertOutcome};
use knowledge_harness_core::KbError;

use crate::config::Config;
use crate::scanner::{self, ScannedFile};
use crate::sqlite_store::SqliteStore;

/// Fallback requirements length when a brief has no requirements section.
const REQUIREMENTS_FALLBACK_CHARS: usize = 1000;

/// Resolves guide links by reading the linked file relative to the brief.
pub struct FsGuideLookup {
    base_dir: PathBuf,
}

impl FsGuideLookup {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl GuideLookup for FsGuideLookup {
    fn lookup(&self, target: &str) -> Option<GuideIdentity> {
        let path = self.base_dir.join(target);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "guide not readable");
                return None;
            }
        };
        let (fm, _) = parse_front_matter(&content).ok()?;
        Some(GuideIdentity {
            canonical_id: fm.canonical_id(),
            slug: fm.slug(),
        })
    }
}

fn file_stem(file_name: &str) -> &str {
    file_name.strip_suffix(".md").unwrap_or(file_name)
}

/// The directory two levels above the brief, e.g. `android` for
/// `android/01_beginners/todo.md`.
fn grandparent_name(path: &Path) -> Option<String> {
    path.parent()?
        .parent()?
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
}

/// Parse one brief into a project record.
pub fn parse_project(
    content: &str,
    file: &ScannedFile,
    guides: &dyn GuideLookup,
) -> Result<ProjectRecord, KbError> {
    let fail = |reason: String| KbError::parse(file.source_path.clone(), reason);

    let (fm, body) = parse_front_matter(content).map_err(fail)?;
    let level =
        resolve_level(fm.level().as_deref(), file.inherited_level.as_deref()).map_err(fail)?;
    let estimated_hours = fm.estimated_hours().map_err(fail)?.unwrap_or(0);

    let challenges =
        extract_challenges(&body, guides).map_err(|e| KbError::parse(file.source_path.clone(), e))?;

    let requirements_markdown = extract_requirements(&body)
        .unwrap_or_else(|| body.chars().take(REQUIREMENTS_FALLBACK_CHARS).collect());

    let topic = fm
        .topic()
        .or_else(|| grandparent_name(&file.path))
        .unwrap_or_default();

    Ok(ProjectRecord {
        canonical_id: fm.canonical_id().unwrap_or_else(|| fallback_id("project")),
        slug: fm
            .slug()
            .unwrap_or_else(|| file_stem(&file.file_name).to_string()),
        title: fm.title().unwrap_or_else(|| file.file_name.clone()),
        description: fm.description().unwrap_or_default(),
        level,
        topic,
        requirements_markdown,
        topics_covered: fm.topics_covered(),
        estimated_hours,
        challenges,
        prerequisites: fm.prerequisites(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct ProjectIndexReport {
    pub scanned: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Scan a brief corpus and upsert every brief.
pub async fn index_projects<S: Store + ?Sized>(
    store: &S,
    root: &Path,
    config: &Config,
) -> Result<ProjectIndexReport> {
    let files = scanner::discover(root, &config.scanner)?;
    let mut report = ProjectIndexReport {
        scanned: files.len(),
        ..ProjectIndexReport::default()
    };

    for file in &files {
        let parsed = std::fs::read_to_string(&file.path)
            .map_err(|e| KbError::parse(file.source_path.clone(), e))
            .and_then(|content| {
                let base = file.path.parent().unwrap_or(root);
                parse_project(&content, file, &FsGuideLookup::new(base))
            });

        let project = match parsed {
            Ok(project) => project,
            Err(err) => {
                tracing::warn!(path = %file.source_path, error = %err, "skipping project brief");
                report.failed += 1;
                continue;
            }
        };

        match store.upsert_project(&project).await {
            Ok(UpsertOutcome::Inserted) => report.inserted += 1,
            Ok(UpsertOutcome::Updated) => report.updated += 1,
            Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
            Err(err) => {
                tracing::warn!(path = %file.source_path, error = %err, "failed to store project");
                report.failed += 1;
                continue;
            }
        }
        tracing::debug!(
            title = %project.title,
            topic = %project.topic,
            level = %project.level,
            "indexed project"
        );
    }

    Ok(report)
}

pub async fn run_index(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let root = match path.or_else(|| config.projects.root.clone()) {
        Some(root) => root,
        None => bail!("No project corpus given. Pass a path or set [projects] root in config."),
    };

    let store = SqliteStore::open(config).await?;
    let report = index_projects(&store, &root, config).await;
    store.close().await;
    let report = report?;

    println!("projects {}", root.display());
    println!("  scanned: {} files", report.scanned);
    println!("  inserted: {}", report.inserted);
    println!("  updated: {}", report.updated);
    println!("  unchanged: {}", report.unchanged);
    println!("  failed: {}", report.failed);
    println!("ok");
    Ok(())
}

pub async fn run_list(config: &Config, topic: Option<&str>, level: Option<Level>) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let projects = store.list_projects(topic, level).await;
    store.close().await;
    let projects = projects?;

    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }

    println!(
        "{:<28} {:<14} {:<16} {:>6}  TITLE",
        "SLUG", "LEVEL", "TOPIC", "HOURS"
    );
    println!("{}", "-".repeat(88));
    for p in &projects {
        println!(
            "{:<28} {:<14} {:<16} {:>6}  {}",
            p.slug,
            p.level.as_str(),
            p.topic,
            p.estimated_hours,
            p.title
        );
    }
    Ok(())
}

pub async fn run_show(config: &Config, slug: &str, topic: Option<&str>, json: bool) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let project = store.get_project(slug, topic).await;
    store.close().await;

    let Some(project) = project? else {
        bail!("project not found: {}", slug);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&project)?);
        return Ok(());
    }

    println!("--- Project ---");
    println!("id:        {}", project.canonical_id);
    println!("slug:      {}", project.slug);
    println!("title:     {}", project.title);
    println!("level:     {}", project.level);
    println!("topic:     {}", project.topic);
    println!("hours:     {}", project.estimated_hours);
    if !project.topics_covered.is_empty() {
        println!("covers:    {}", project.topics_covered.join(", "));
    }
    if !project.prerequisites.is_empty() {
        println!("requires:  {}", project.prerequisites.join(", "));
    }
    if !project.description.is_empty() {
        println!();
        println!("{}", project.description);
    }

    for challenge in &project.challenges {
        println!();
        println!(
            "--- Challenge {}: {} ({}) ---",
            challenge.challenge_number, challenge.challenge_title, challenge.difficulty
        );
        for step in &challenge.steps {
            println!("  [{}] {}", step.number, step.title);
            if !step.guide_references.is_empty() {
                println!("        guides: {}", step.guide_references.join(", "));
            }
            if let Some(ref hints) = step.hints {
                println!("        hints: {}", hints.len());
            }
        }
    }
    Ok(())
}

pub async fn run_topics(config: &Config) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let topics = store.project_topics().await;
    store.close().await;
    let topics = topics?;

    if topics.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    println!("{:<20} {:<28} {:>8}", "TOPIC", "NAME", "PROJECTS");
    for t in &topics {
        println!("{:<20} {:<28} {:>8}", t.name, t.display_name, t.project_count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_harness_core::models::CompletionStatus;
    use knowledge_harness_core::store::memory::InMemoryStore;
    use std::fs;
    use tempfile::TempDir;

    const BRIEF: &str = r#"---
canonical_id: "proj-todo"
title: "Todo App"
description: "Build a todo list."
topics_covered: "room, compose"
estimated_hours: 6
prerequisites: ["android-01"]
---

# Todo App

### Project Requirements
- Persist items
- Offline first

## Challenge 1: Setup (Easy)

#### Step 1.1: Install SDK
Install the Android SDK.

### Guide References
- [Intro](../../../guides/intro.md)
- [Missing](../../../guides/02.%20Missing%20Guide.md)
"#;

    fn layout() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let projects = tmp.path().join("projects");
        let brief_dir = projects.join("android").join("01_beginners");
        fs::create_dir_all(&brief_dir).unwrap();
        fs::write(brief_dir.join("todo.md"), BRIEF).unwrap();

        let guides = tmp.path().join("guides");
        fs::create_dir_all(&guides).unwrap();
        fs::write(
            guides.join("intro.md"),
            "---\ncanonical_id: \"android-01\"\nslug: \"intro\"\n---\nbody",
        )
        .unwrap();
        (tmp, projects)
    }

    #[test]
    fn test_fs_lookup_reads_guide() {
        let (_tmp, projects) = layout();
        let lookup = FsGuideLookup::new(projects.join("android/01_beginners"));
        let found = lookup.lookup("../../../guides/intro.md").unwrap();
        assert_eq!(found.canonical_id.as_deref(), Some("android-01"));
        assert!(lookup.lookup("../../../guides/none.md").is_none());
    }

    #[tokio::test]
    async fn test_index_projects() {
        let (_tmp, projects) = layout();
        let store = InMemoryStore::new();
        let config = Config::minimal();

        let report = index_projects(&store, &projects, &config).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.failed, 0);

        let todo = store.get_project("todo", Some("android")).await.unwrap().unwrap();
        assert_eq!(todo.canonical_id, "proj-todo");
        assert_eq!(todo.level, Level::Beginner);
        assert_eq!(todo.title, "Todo App");
        assert_eq!(todo.estimated_hours, 6);
        assert_eq!(todo.topics_covered, vec!["room", "compose"]);
        assert_eq!(todo.prerequisites, vec!["android-01"]);
        assert!(todo.requirements_markdown.starts_with("### Project Requirements"));
        assert!(todo.requirements_markdown.contains("Offline first"));

        assert_eq!(todo.challenges.len(), 1);
        let challenge = &todo.challenges[0];
        assert_eq!(challenge.difficulty, "easy");
        assert_eq!(challenge.completion_status, CompletionStatus::NotStarted);
        let step = &challenge.steps[0];
        assert_eq!(step.number, 101);
        assert_eq!(step.guide_references, vec!["android-01", "02. Missing Guide"]);

        let again = index_projects(&store, &projects, &config).await.unwrap();
        assert_eq!(again.unchanged, 1);
    }

    #[test]
    fn test_defaults_without_front_matter() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("web/02_intermediate/blog.md");
        let file = ScannedFile {
            path,
            source_path: "projects/web/02_intermediate/blog.md".into(),
            file_name: "blog.md".into(),
            inherited_level: Some("intermediate".into()),
        };
        let body = "x".repeat(1500);
        let project =
            parse_project(&body, &file, &knowledge_harness_core::steps::NoGuides).unwrap();
        assert!(project.canonical_id.starts_with("project-"));
        assert_eq!(project.slug, "blog");
        assert_eq!(project.title, "blog.md");
        assert_eq!(project.topic, "web");
        assert_eq!(project.level, Level::Intermediate);
        assert_eq!(project.requirements_markdown.len(), 1000);
        assert!(project.challenges.is_empty());
    }
}
