//! Turning human-readable document links into stored records.
//!
//! Documents link to each other by file name (`./14. Android Services - Complete Guide.md`)
//! and file names drift as documents get renumbered or retitled. Resolution
//! therefore walks an ordered ladder of strategies, most precise first, and
//! stops at the first hit:
//!
//! 1. stored path ends with `/<name>.md`
//! 2. same, with a leading `NN. ` prefix stripped from the name
//! 3. title equals the full name (case-insensitive)
//! 4. title equals the prefix-stripped name (case-insensitive)
//! 5. title contains the prefix-stripped name (case-insensitive)
//! 6. title contains the name's significant words in order, shortest title wins

use regex::Regex;

use crate::models::KnowledgeRecord;

/// Words ignored when building the significant-word pattern.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "into", "onto", "your", "you", "are", "how", "what",
    "why", "when", "guide", "complete", "using",
];

const MAX_SIGNIFICANT_WORDS: usize = 3;

/// A decoded link target, prepared once for every strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    /// Decoded file name without directory or `.md` extension.
    pub name: String,
    /// `name` without a leading `NN. ` numeric prefix.
    pub stripped: String,
}

impl FileQuery {
    /// Prepare a raw link target: keep the last path component, URL-decode it,
    /// drop a `.md` extension.
    pub fn new(raw: &str) -> Self {
        let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
        let decoded = urlencoding::decode(last)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| last.to_string());
        let name = decoded
            .strip_suffix(".md")
            .unwrap_or(&decoded)
            .trim()
            .to_string();
        let stripped = strip_number_prefix(&name).to_string();
        Self { name, stripped }
    }
}

/// Strip a leading `NN.` (and the whitespace after it) from a file name.
pub fn strip_number_prefix(name: &str) -> &str {
    let digits = name.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return name;
    }
    match name[digits..].strip_prefix('.') {
        Some(rest) => rest.trim_start(),
        None => name,
    }
}

/// Up to three lowercase tokens longer than two characters, stop words removed.
pub fn significant_words(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .take(MAX_SIGNIFICANT_WORDS)
        .collect()
}

pub type Strategy = for<'a> fn(&FileQuery, &'a [KnowledgeRecord]) -> Option<&'a KnowledgeRecord>;

/// The ladder, in precedence order.
pub const STRATEGIES: [(&str, Strategy); 6] = [
    ("path", by_path),
    ("path-stripped", by_stripped_path),
    ("title", by_title),
    ("title-stripped", by_stripped_title),
    ("title-contains", by_title_contains),
    ("significant-words", by_significant_words),
];

fn path_suffix_match<'a>(
    name: &str,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    if name.is_empty() {
        return None;
    }
    let suffix = format!("/{}.md", name);
    records.iter().find(|r| r.source_path.ends_with(&suffix))
}

pub fn by_path<'a>(q: &FileQuery, records: &'a [KnowledgeRecord]) -> Option<&'a KnowledgeRecord> {
    path_suffix_match(&q.name, records)
}

pub fn by_stripped_path<'a>(
    q: &FileQuery,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    if q.stripped == q.name {
        return None;
    }
    path_suffix_match(&q.stripped, records)
}

fn title_equals<'a>(needle: &str, records: &'a [KnowledgeRecord]) -> Option<&'a KnowledgeRecord> {
    if needle.is_empty() {
        return None;
    }
    let needle = needle.to_lowercase();
    records.iter().find(|r| r.title.to_lowercase() == needle)
}

pub fn by_title<'a>(q: &FileQuery, records: &'a [KnowledgeRecord]) -> Option<&'a KnowledgeRecord> {
    title_equals(&q.name, records)
}

pub fn by_stripped_title<'a>(
    q: &FileQuery,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    title_equals(&q.stripped, records)
}

pub fn by_title_contains<'a>(
    q: &FileQuery,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    if q.stripped.is_empty() {
        return None;
    }
    let needle = q.stripped.to_lowercase();
    records
        .iter()
        .find(|r| r.title.to_lowercase().contains(&needle))
}

/// True when every word occurs in `haystack`, each after the previous one.
fn contains_in_order(haystack: &str, words: &[String]) -> bool {
    let mut rest = haystack;
    for word in words {
        match rest.find(word.as_str()) {
            Some(pos) => rest = &rest[pos + word.len()..],
            None => return false,
        }
    }
    true
}

pub fn by_significant_words<'a>(
    q: &FileQuery,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    let words = significant_words(&q.stripped);
    if words.is_empty() {
        return None;
    }
    records
        .iter()
        .filter(|r| contains_in_order(&r.title.to_lowercase(), &words))
        .min_by_key(|r| r.title.chars().count())
}

/// Run the filename ladder over `records`.
pub fn resolve_filename<'a>(
    raw: &str,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    let query = FileQuery::new(raw);
    for (name, strategy) in STRATEGIES.iter() {
        if let Some(hit) = strategy(&query, records) {
            tracing::debug!(
                strategy = *name,
                file = %raw,
                hit = %hit.canonical_id,
                "resolved filename"
            );
            return Some(hit);
        }
    }
    tracing::debug!(file = %raw, "filename did not resolve");
    None
}

/// Resolve a link token that may be a canonical id, a slug, or a file name.
pub fn resolve_reference<'a>(
    token: &str,
    records: &'a [KnowledgeRecord],
) -> Option<&'a KnowledgeRecord> {
    records
        .iter()
        .find(|r| r.canonical_id == token)
        .or_else(|| records.iter().find(|r| r.slug == token))
        .or_else(|| resolve_filename(token, records))
}

/// A `[text](target.md)` link from one document to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLink {
    /// 1-based line within the body.
    pub line: usize,
    pub text: String,
    /// Target as written, query and fragment removed.
    pub target: String,
    /// `target`, URL-decoded.
    pub decoded: String,
}

/// Markdown links to other `.md` documents in `body`.
///
/// External URLs and non-markdown targets are skipped, as is anything inside
/// a fenced code block.
pub fn document_links(body: &str) -> Result<Vec<DocumentLink>, regex::Error> {
    let pattern = Regex::new(r"\[([^\]]+)\]\(([^)]+)\)")?;
    let mut links = Vec::new();
    let mut in_fence = false;
    for (index, line) in body.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        for caps in pattern.captures_iter(line) {
            let (Some(text), Some(raw)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let target = link_path(raw.as_str());
            if target.contains("://") || !target.ends_with(".md") {
                continue;
            }
            let decoded = urlencoding::decode(target)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| target.to_string());
            links.push(DocumentLink {
                line: index + 1,
                text: text.as_str().to_string(),
                target: target.to_string(),
                decoded,
            });
        }
    }
    Ok(links)
}

/// Drop a `"title"` suffix, then any query or fragment.
fn link_path(raw: &str) -> &str {
    let raw = match raw.find(" \"") {
        Some(pos) if raw.ends_with('"') => &raw[..pos],
        _ => raw,
    };
    raw.split(['?', '#']).next().unwrap_or(raw).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Level;

    fn doc(id: &str, title: &str, path: &str) -> KnowledgeRecord {
        KnowledgeRecord {
            canonical_id: id.to_string(),
            slug: id.to_string(),
            title: title.to_string(),
            level: Level::Beginner,
            sequence_number: 1,
            source_path: path.to_string(),
            knowledgebase: "android".to_string(),
            tags: Default::default(),
            prerequisites: Vec::new(),
            estimated_minutes: 0,
            body: String::new(),
        }
    }

    fn corpus() -> Vec<KnowledgeRecord> {
        vec![
            doc(
                "android-services",
                "Android Services",
                "android/01_beginners/14. Android Services - Complete Guide.md",
            ),
            doc(
                "android-intents",
                "Intents and Intent Filters",
                "android/01_beginners/Intents.md",
            ),
            doc(
                "android-lifecycle",
                "Activity Lifecycle Deep Dive",
                "android/02_intermediate/07. Lifecycle.md",
            ),
            doc(
                "android-lifecycle-long",
                "Activity Lifecycle Deep Dive With Fragments",
                "android/02_intermediate/08. Fragments.md",
            ),
        ]
    }

    #[test]
    fn test_file_query_decodes_and_strips() {
        let q = FileQuery::new("./14.%20Android%20Services%20-%20Complete%20Guide.md");
        assert_eq!(q.name, "14. Android Services - Complete Guide");
        assert_eq!(q.stripped, "Android Services - Complete Guide");
    }

    #[test]
    fn test_strip_number_prefix() {
        assert_eq!(strip_number_prefix("07. Lifecycle"), "Lifecycle");
        assert_eq!(strip_number_prefix("7.Lifecycle"), "Lifecycle");
        assert_eq!(strip_number_prefix("Lifecycle"), "Lifecycle");
        assert_eq!(strip_number_prefix("2024 plans"), "2024 plans");
    }

    #[test]
    fn test_significant_words() {
        assert_eq!(
            significant_words("The Complete Guide to Android Services and Intents"),
            vec!["android", "services", "intents"]
        );
        assert!(significant_words("a of to").is_empty());
    }

    #[test]
    fn test_exact_path_suffix() {
        let records = corpus();
        let q = FileQuery::new("./14. Android Services - Complete Guide.md");
        let hit = by_path(&q, &records).unwrap();
        assert_eq!(hit.canonical_id, "android-services");
    }

    #[test]
    fn test_stripped_path_after_renumbering() {
        let records = corpus();
        let q = FileQuery::new("03. Intents.md");
        assert!(by_path(&q, &records).is_none());
        let hit = by_stripped_path(&q, &records).unwrap();
        assert_eq!(hit.canonical_id, "android-intents");
    }

    #[test]
    fn test_title_strategies() {
        let records = corpus();
        let q = FileQuery::new("android services.md");
        assert_eq!(by_title(&q, &records).unwrap().canonical_id, "android-services");

        let q = FileQuery::new("99. Intents and Intent Filters.md");
        assert!(by_title(&q, &records).is_none());
        assert_eq!(
            by_stripped_title(&q, &records).unwrap().canonical_id,
            "android-intents"
        );

        let q = FileQuery::new("intent filters.md");
        assert_eq!(
            by_title_contains(&q, &records).unwrap().canonical_id,
            "android-intents"
        );
    }

    #[test]
    fn test_significant_words_prefers_shortest_title() {
        let records = corpus();
        let q = FileQuery::new("The Activity Lifecycle Guide.md");
        let hit = by_significant_words(&q, &records).unwrap();
        assert_eq!(hit.canonical_id, "android-lifecycle");
    }

    #[test]
    fn test_ladder_prefers_earlier_strategy() {
        let mut records = corpus();
        // A title match exists, but the path match must win.
        records.push(doc("decoy", "Intents", "android/03_advanced/Other.md"));
        let hit = resolve_filename("Intents.md", &records).unwrap();
        assert_eq!(hit.canonical_id, "android-intents");
    }

    #[test]
    fn test_unresolvable_is_none() {
        let records = corpus();
        assert!(resolve_filename("Jetpack Compose.md", &records).is_none());
        assert!(resolve_filename("", &records).is_none());
    }

    #[test]
    fn test_resolve_reference_order() {
        let records = corpus();
        assert_eq!(
            resolve_reference("android-intents", &records).unwrap().canonical_id,
            "android-intents"
        );
        assert_eq!(
            resolve_reference("Lifecycle.md", &records).unwrap().canonical_id,
            "android-lifecycle"
        );
    }

    #[test]
    fn test_document_links() {
        let body = "Intro line.\n\
            See [Services](./14.%20Android%20Services.md?plain=1#top) and [web](https://example.com/x.md).\n\
            ```\n[in code](./Hidden.md)\n```\n\
            [image](./diagram.png) then [Intents](../01_beginners/Intents.md \"Intents\")\n";

        let links = document_links(body).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].line, 2);
        assert_eq!(links[0].text, "Services");
        assert_eq!(links[0].target, "./14.%20Android%20Services.md");
        assert_eq!(links[0].decoded, "./14. Android Services.md");
        assert_eq!(links[1].line, 6);
        assert_eq!(links[1].target, "../01_beginners/Intents.md");
        assert_eq!(FileQuery::new(&links[1].target).name, "Intents");
    }
}
