//! Metadata header parsing (the Document Parser).
//!
//! A source document starts with a `---`-delimited header of `key: value`
//! pairs (YAML, list values written as `[ "a", "b" ]`), followed by the
//! markdown body. A document without an opening delimiter has an empty
//! header and its whole text is the body.

use serde::Deserialize;
use std::collections::BTreeSet;

use crate::error::KbError;
use crate::models::{normalize_level, KnowledgeRecord, Level};

const DELIMITER: &str = "---";

/// A scalar header value. Authors write numbers and strings interchangeably
/// (`number: 3` vs `number: "03"`, `prerequisites: [1, "intro"]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Scalar {
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Text(s) => s.trim().to_string(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A list-valued key, tolerant of a single scalar or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarList {
    Many(Vec<Scalar>),
    One(Scalar),
}

impl ScalarList {
    pub fn into_strings(self) -> Vec<String> {
        let raw: Vec<String> = match self {
            ScalarList::Many(items) => items.iter().map(Scalar::as_text).collect(),
            ScalarList::One(Scalar::Text(s)) => s.split(',').map(str::to_string).collect(),
            ScalarList::One(other) => vec![other.as_text()],
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Decoded metadata header. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub canonical_id: Option<Scalar>,
    pub slug: Option<Scalar>,
    pub title: Option<Scalar>,
    pub level: Option<Scalar>,
    pub number: Option<Scalar>,
    pub tags: Option<ScalarList>,
    pub prerequisites: Option<ScalarList>,
    pub estimated_minutes: Option<Scalar>,
    pub contributors: Option<ScalarList>,
    // Project briefs
    pub description: Option<Scalar>,
    pub topic: Option<Scalar>,
    pub topics_covered: Option<ScalarList>,
    pub estimated_hours: Option<Scalar>,
}

fn text_field(value: &Option<Scalar>) -> Option<String> {
    value
        .as_ref()
        .map(Scalar::as_text)
        .filter(|s| !s.is_empty())
}

fn int_field(value: &Option<Scalar>, key: &str) -> Result<Option<i64>, String> {
    match value {
        None => Ok(None),
        Some(v) => v
            .as_int()
            .map(Some)
            .ok_or_else(|| format!("'{}' must be an integer, got '{}'", key, v.as_text())),
    }
}

fn list_field(value: &Option<ScalarList>) -> Vec<String> {
    value.clone().map(ScalarList::into_strings).unwrap_or_default()
}

impl FrontMatter {
    pub fn canonical_id(&self) -> Option<String> {
        text_field(&self.canonical_id)
    }

    pub fn slug(&self) -> Option<String> {
        text_field(&self.slug)
    }

    pub fn title(&self) -> Option<String> {
        text_field(&self.title)
    }

    pub fn level(&self) -> Option<String> {
        text_field(&self.level)
    }

    pub fn number(&self) -> Result<Option<i64>, String> {
        int_field(&self.number, "number")
    }

    pub fn estimated_minutes(&self) -> Result<Option<i64>, String> {
        int_field(&self.estimated_minutes, "estimated_minutes")
    }

    pub fn estimated_hours(&self) -> Result<Option<i64>, String> {
        int_field(&self.estimated_hours, "estimated_hours")
    }

    pub fn tags(&self) -> Vec<String> {
        list_field(&self.tags)
    }

    pub fn prerequisites(&self) -> Vec<String> {
        list_field(&self.prerequisites)
    }

    pub fn contributors(&self) -> Vec<String> {
        list_field(&self.contributors)
    }

    pub fn description(&self) -> Option<String> {
        text_field(&self.description)
    }

    pub fn topic(&self) -> Option<String> {
        text_field(&self.topic)
    }

    pub fn topics_covered(&self) -> Vec<String> {
        list_field(&self.topics_covered)
    }
}

/// Split a document into its raw header (if any) and body.
pub fn split_front_matter(content: &str) -> Result<(Option<&str>, &str), String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) => line,
        None => return Ok((None, content)),
    };
    if first.trim_end() != DELIMITER {
        return Ok((None, content));
    }

    let header_start = first.len();
    let mut offset = header_start;
    for line in lines {
        if line.trim_end() == DELIMITER {
            let header = &content[header_start..offset];
            let body = &content[offset + line.len()..];
            return Ok((Some(header), body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }

    Err("unterminated metadata header: missing closing '---'".to_string())
}

/// Split and decode a document's header.
pub fn parse_front_matter(content: &str) -> Result<(FrontMatter, String), String> {
    let (header, body) = split_front_matter(content)?;
    let front_matter = match header {
        Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str::<FrontMatter>(raw)
            .map_err(|e| format!("malformed metadata header: {}", e))?,
        _ => FrontMatter::default(),
    };
    Ok((front_matter, body.to_string()))
}

/// Where a document was found; supplies the defaults for missing header keys.
#[derive(Debug, Clone)]
pub struct DocumentContext<'a> {
    /// `/`-separated path stored as the record's `source_path`.
    pub source_path: &'a str,
    /// File name including the extension.
    pub file_name: &'a str,
    pub knowledgebase: &'a str,
    /// Level inherited from the nearest level folder, already normalized.
    pub inherited_level: Option<&'a str>,
}

impl DocumentContext<'_> {
    fn file_stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(idx) if idx > 0 => &self.file_name[..idx],
            _ => self.file_name,
        }
    }
}

/// Resolve a raw level against the canonical four, defaulting to beginner.
pub fn resolve_level(header: Option<&str>, inherited: Option<&str>) -> Result<Level, String> {
    match header.or(inherited) {
        Some(raw) => normalize_level(raw).parse(),
        None => Ok(Level::Beginner),
    }
}

/// Fallback canonical id for documents that do not declare one.
pub fn fallback_id(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_millis())
}

/// Parse one document into a [`KnowledgeRecord`], filling missing keys from `ctx`.
pub fn parse_document(
    content: &str,
    ctx: &DocumentContext<'_>,
) -> Result<KnowledgeRecord, KbError> {
    let fail = |reason: String| KbError::parse(ctx.source_path, reason);

    let (fm, body) = parse_front_matter(content).map_err(fail)?;

    let level = resolve_level(fm.level().as_deref(), ctx.inherited_level).map_err(fail)?;
    let sequence_number = fm.number().map_err(fail)?.unwrap_or(0);
    let estimated_minutes = fm.estimated_minutes().map_err(fail)?.unwrap_or(0);

    let canonical_id = fm.canonical_id().unwrap_or_else(|| {
        tracing::warn!(
            path = ctx.source_path,
            "document has no canonical_id, using a generated one"
        );
        fallback_id("unknown")
    });

    let tags: BTreeSet<String> = fm.tags().into_iter().collect();

    Ok(KnowledgeRecord {
        canonical_id,
        slug: fm.slug().unwrap_or_else(|| ctx.file_stem().to_string()),
        title: fm.title().unwrap_or_else(|| ctx.file_name.to_string()),
        level,
        sequence_number,
        source_path: ctx.source_path.to_string(),
        knowledgebase: ctx.knowledgebase.to_string(),
        tags,
        prerequisites: fm.prerequisites(),
        estimated_minutes,
        body,
    })
}
