//! Core data models used throughout Knowledge Harness.
//!
//! These types represent the ingested documents, the roadmap projection
//! built from them, and the project briefs produced by the step extractor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One of the four ordered difficulty tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
    Overachiever,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Beginner,
        Level::Intermediate,
        Level::Advanced,
        Level::Overachiever,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
            Level::Overachiever => "overachiever",
        }
    }

    /// Fixed ordinal used for roadmap ordering: beginner=0 … overachiever=3.
    pub fn rank(&self) -> u8 {
        match self {
            Level::Beginner => 0,
            Level::Intermediate => 1,
            Level::Advanced => 2,
            Level::Overachiever => 3,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    /// Parses a raw level, applying [`normalize_level`] first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_level(s).as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            "overachiever" => Ok(Level::Overachiever),
            other => Err(format!(
                "unknown level '{}': expected beginner, intermediate, advanced, or overachiever",
                other
            )),
        }
    }
}

/// Normalize a raw level name (usually taken from a folder like `01_beginners`).
///
/// The value is trimmed and lowercased, then mapped through the plural/alias
/// table. Anything not in the table passes through unchanged, which makes the
/// function idempotent.
pub fn normalize_level(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    match lowered.as_str() {
        "beginners" | "fundamentals" => "beginner".to_string(),
        "intermediates" => "intermediate".to_string(),
        "advanceds" => "advanced".to_string(),
        "overachievers" => "overachiever".to_string(),
        _ => lowered,
    }
}

/// If `name` is a level folder (`<digits>_<levelname>`), return the raw level name.
pub fn level_folder_name(name: &str) -> Option<&str> {
    let (prefix, rest) = name.split_once('_')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) || rest.is_empty() {
        return None;
    }
    Some(rest)
}

/// Infer the topic of a stored path: the segment right after the
/// knowledgebase segment, unless that segment is a level folder or the file
/// itself.
pub fn topic_of(source_path: &str, knowledgebase: &str) -> Option<String> {
    let parts: Vec<&str> = source_path.split('/').collect();
    let kb_index = parts.iter().position(|p| *p == knowledgebase)?;
    let candidate_index = kb_index + 1;
    // The last segment is the file name, never a topic.
    if candidate_index + 1 >= parts.len() {
        return None;
    }
    let candidate = parts[candidate_index];
    if candidate.is_empty() || level_folder_name(candidate).is_some() {
        return None;
    }
    Some(candidate.to_string())
}

/// One ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    /// Globally unique key; ingestion upserts on it.
    pub canonical_id: String,
    /// Unique within a knowledgebase.
    pub slug: String,
    pub title: String,
    pub level: Level,
    /// Ordering hint within `(knowledgebase, level)`.
    pub sequence_number: i64,
    /// Path of the source file, `/`-separated.
    pub source_path: String,
    pub knowledgebase: String,
    pub tags: BTreeSet<String>,
    /// Each entry is a canonical id, a slug, or a sequence number as a string.
    pub prerequisites: Vec<String>,
    pub estimated_minutes: i64,
    /// Document text after the metadata header.
    pub body: String,
}

impl KnowledgeRecord {
    pub fn topic(&self) -> Option<String> {
        topic_of(&self.source_path, &self.knowledgebase)
    }

    pub fn to_node(&self) -> RoadmapNode {
        RoadmapNode {
            id: self.canonical_id.clone(),
            title: self.title.clone(),
            slug: self.slug.clone(),
            level: self.level,
            knowledgebase: self.knowledgebase.clone(),
            prerequisites: self.prerequisites.clone(),
        }
    }
}

/// Filters accepted by `query` and `search`. Empty fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub level: Option<Level>,
    pub knowledgebase: Option<String>,
    /// Matches records whose path contains `/<topic>/`.
    pub topic: Option<String>,
    /// "Any of" match against the record's tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QueryFilters {
    pub fn for_knowledgebase(knowledgebase: &str) -> Self {
        Self {
            knowledgebase: Some(knowledgebase.to_string()),
            ..Self::default()
        }
    }

    pub fn with_topic(mut self, topic: Option<&str>) -> Self {
        self.topic = topic.map(str::to_string);
        self
    }

    /// The `/<topic>/` path segment a record must contain, matched exactly
    /// (case-sensitive) by every store.
    pub fn topic_segment(&self) -> Option<String> {
        self.topic.as_ref().map(|topic| format!("/{}/", topic))
    }

    /// In-process evaluation of the filter set, used by non-SQL stores.
    pub fn matches(&self, record: &KnowledgeRecord) -> bool {
        if let Some(level) = self.level {
            if record.level != level {
                return false;
            }
        }
        if let Some(ref kb) = self.knowledgebase {
            if &record.knowledgebase != kb {
                return false;
            }
        }
        if let Some(segment) = self.topic_segment() {
            if !record.source_path.contains(&segment) {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| record.tags.contains(t)) {
            return false;
        }
        true
    }
}

/// View-layer projection of a [`KnowledgeRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapNode {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub level: Level,
    pub knowledgebase: String,
    pub prerequisites: Vec<String>,
}

/// Directed prerequisite → dependent edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoadmapEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl RoadmapEdge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            id: format!("{}-{}", source, target),
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    pub knowledgebase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub nodes: Vec<RoadmapNode>,
    pub edges: Vec<RoadmapEdge>,
}

/// A project brief, stored separately from knowledge records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub canonical_id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub level: Level,
    pub topic: String,
    pub requirements_markdown: String,
    pub topics_covered: Vec<String>,
    pub estimated_hours: i64,
    pub challenges: Vec<Challenge>,
    /// Canonical ids of guides this project builds on.
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_number: i64,
    pub challenge_title: String,
    /// Lowercased difficulty taken from the heading, e.g. `easy`.
    pub difficulty: String,
    pub steps: Vec<Step>,
    pub completion_status: CompletionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// `challenge_number * 100 + ordinal within the challenge`.
    pub number: i64,
    pub title: String,
    pub description: String,
    pub guide_references: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_examples: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgebaseSummary {
    pub name: String,
    pub file_count: i64,
    pub level_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub name: String,
    pub file_count: i64,
    pub level_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTopicSummary {
    pub name: String,
    pub display_name: String,
    pub project_count: i64,
}

/// Human-readable name for a project topic.
pub fn topic_display_name(topic: &str) -> String {
    match topic {
        "android" => "Android Development".to_string(),
        "devops" => "DevOps".to_string(),
        "backend" => "Backend Development".to_string(),
        "frontend" => "Frontend Development".to_string(),
        "fullstack" => "Full Stack Development".to_string(),
        "mobile" => "Mobile Development".to_string(),
        "web" => "Web Development".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}
