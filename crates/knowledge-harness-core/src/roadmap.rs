//! Roadmap graph construction.
//!
//! Documents become nodes ordered by `(level rank, sequence number)`. Each
//! declared prerequisite becomes an edge `prerequisite → dependent`, resolved
//! through an ordered list of strategies. A node with no declared
//! prerequisites is chained to the node right before it when that node sits
//! at the same level or one level below.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::models::{KnowledgeRecord, QueryFilters, Roadmap, RoadmapEdge};
use crate::store::Store;

/// Lookup tables over the filtered document set.
struct PrerequisiteIndex<'a> {
    by_key: HashMap<&'a str, &'a KnowledgeRecord>,
    sorted: &'a [&'a KnowledgeRecord],
}

impl<'a> PrerequisiteIndex<'a> {
    fn new(sorted: &'a [&'a KnowledgeRecord]) -> Self {
        let mut by_key: HashMap<&'a str, &'a KnowledgeRecord> = HashMap::new();
        // Canonical ids win over a slug spelled the same way.
        for &r in sorted {
            by_key.insert(r.canonical_id.as_str(), r);
        }
        for &r in sorted {
            by_key.entry(r.slug.as_str()).or_insert(r);
        }
        Self { by_key, sorted }
    }
}

type PrerequisiteStrategy =
    for<'a> fn(&str, &PrerequisiteIndex<'a>) -> Option<&'a KnowledgeRecord>;

fn by_id_or_slug<'a>(token: &str, index: &PrerequisiteIndex<'a>) -> Option<&'a KnowledgeRecord> {
    index.by_key.get(token).copied()
}

fn by_sequence_number<'a>(
    token: &str,
    index: &PrerequisiteIndex<'a>,
) -> Option<&'a KnowledgeRecord> {
    let number: i64 = token.parse().ok()?;
    index
        .sorted
        .iter()
        .find(|r| r.sequence_number == number)
        .copied()
}

const PREREQUISITE_STRATEGIES: [PrerequisiteStrategy; 2] = [by_id_or_slug, by_sequence_number];

/// Resolve one prerequisite token for `node`. A strategy that lands on the
/// node itself does not count as a hit.
fn resolve_prerequisite<'a>(
    token: &str,
    node: &KnowledgeRecord,
    index: &PrerequisiteIndex<'a>,
) -> Option<&'a KnowledgeRecord> {
    PREREQUISITE_STRATEGIES
        .iter()
        .filter_map(|strategy| strategy(token, index))
        .find(|hit| hit.canonical_id != node.canonical_id)
}

/// Level-transition rule for the implicit previous-node edge.
///
/// This is a heuristic: it keeps level changes linear by default and carries
/// no deeper meaning than that.
pub fn chains_implicitly(previous: &KnowledgeRecord, current: &KnowledgeRecord) -> bool {
    let prev = previous.level.rank();
    let cur = current.level.rank();
    cur == prev || cur == prev + 1
}

fn declared_prerequisites(record: &KnowledgeRecord) -> impl Iterator<Item = &str> {
    record
        .prerequisites
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
}

/// Build the roadmap for an already-filtered document set.
pub fn build_roadmap(
    records: &[KnowledgeRecord],
    knowledgebase: &str,
    topic: Option<&str>,
) -> Roadmap {
    let mut sorted: Vec<&KnowledgeRecord> = records.iter().collect();
    sorted.sort_by_key(|r| (r.level.rank(), r.sequence_number));

    let index = PrerequisiteIndex::new(&sorted);
    let mut edges: Vec<RoadmapEdge> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut push = |edge: RoadmapEdge| {
        if seen.insert(edge.id.clone()) {
            edges.push(edge);
        }
    };

    for (i, node) in sorted.iter().enumerate() {
        let mut declared = declared_prerequisites(node).peekable();
        if declared.peek().is_some() {
            for token in declared {
                match resolve_prerequisite(token, node, &index) {
                    Some(prereq) => {
                        push(RoadmapEdge::new(&prereq.canonical_id, &node.canonical_id))
                    }
                    None => tracing::debug!(
                        node = %node.canonical_id,
                        prerequisite = token,
                        "prerequisite outside the current document set"
                    ),
                }
            }
        } else if i > 0 {
            let previous = sorted[i - 1];
            if chains_implicitly(previous, node) {
                push(RoadmapEdge::new(&previous.canonical_id, &node.canonical_id));
            }
        }
    }

    Roadmap {
        knowledgebase: knowledgebase.to_string(),
        topic: topic.map(str::to_string),
        nodes: sorted.iter().map(|r| r.to_node()).collect(),
        edges,
    }
}

/// Query the store for a knowledgebase (and optional topic) and build its roadmap.
pub async fn query_roadmap<S: Store + ?Sized>(
    store: &S,
    knowledgebase: &str,
    topic: Option<&str>,
) -> Result<Roadmap> {
    let filters = QueryFilters::for_knowledgebase(knowledgebase).with_topic(topic);
    let records = store.query(&filters).await?;
    Ok(build_roadmap(&records, knowledgebase, topic))
}
