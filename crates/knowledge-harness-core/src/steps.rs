//! Project brief step extraction.
//!
//! A project brief is a markdown body shaped like:
//!
//! ```text
//! ## Challenge 1: Setup (Easy)
//! #### Step 1.1: Install SDK
//! Prose describing the step...
//! ### Hints
//! - a bullet per hint
//! ### Guide References
//! - [Services](../guides/14. Services.md)
//! ```
//!
//! The body is walked one line at a time by a small state machine. Fenced
//! code blocks are tracked separately so headings inside code never change
//! state. Older briefs use `### Step` instead of `#### Step`; both are read.

use anyhow::Result;
use regex::Regex;

use crate::models::{Challenge, CompletionStatus, Step};

/// Maximum characters kept for a step description.
pub const DESCRIPTION_MAX_CHARS: usize = 500;
/// Number of prose lines a description is built from.
pub const DESCRIPTION_LINES: usize = 3;

/// Line patterns, compiled once per extraction.
struct Patterns {
    challenge: Regex,
    step: Regex,
    link: Regex,
}

impl Patterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            challenge: Regex::new(r"^## Challenge (\d+):\s*(.+?)\s*\(([^()]+)\)\s*$")?,
            step: Regex::new(r"^#{3,4} Step (\d+)\.(\d+):\s*(.+?)\s*$")?,
            link: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)")?,
        })
    }
}

/// Identity of a guide document found behind a reference link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuideIdentity {
    pub canonical_id: Option<String>,
    pub slug: Option<String>,
}

/// Locates the document behind a guide reference link.
///
/// `target` is the decoded link target with any query or fragment removed,
/// e.g. `../guides/14. Android Services.md`.
pub trait GuideLookup {
    fn lookup(&self, target: &str) -> Option<GuideIdentity>;
}

/// Lookup that never finds anything; references fall back to file stems.
pub struct NoGuides;

impl GuideLookup for NoGuides {
    fn lookup(&self, _target: &str) -> Option<GuideIdentity> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InPreamble,
    InChallenge,
    InStep,
    InHints,
    InReferences,
}

#[derive(Default)]
struct StepDraft {
    number: i64,
    title: String,
    prose: Vec<String>,
    references: Vec<String>,
    hints: Vec<String>,
    fences: Vec<String>,
}

impl StepDraft {
    fn finish(self) -> Step {
        let description: String = self
            .prose
            .iter()
            .take(DESCRIPTION_LINES)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(DESCRIPTION_MAX_CHARS)
            .collect();
        Step {
            number: self.number,
            title: self.title,
            description,
            guide_references: self.references,
            code_examples: (!self.fences.is_empty()).then(|| self.fences.join("\n\n")),
            hints: (!self.hints.is_empty()).then_some(self.hints),
        }
    }
}

struct Extractor<'g> {
    patterns: Patterns,
    guides: &'g dyn GuideLookup,
    state: State,
    challenges: Vec<Challenge>,
    challenge_count: i64,
    step: Option<StepDraft>,
    fence: Option<Vec<String>>,
}

impl<'g> Extractor<'g> {
    fn new(guides: &'g dyn GuideLookup) -> Result<Self> {
        Ok(Self {
            patterns: Patterns::new()?,
            guides,
            state: State::InPreamble,
            challenges: Vec::new(),
            challenge_count: 0,
            step: None,
            fence: None,
        })
    }

    fn close_step(&mut self) {
        if let Some(draft) = self.step.take() {
            if let Some(challenge) = self.challenges.last_mut() {
                challenge.steps.push(draft.finish());
            }
        }
    }

    fn open_challenge(&mut self, title: &str, difficulty: &str) {
        self.close_step();
        self.challenge_count += 1;
        self.challenges.push(Challenge {
            challenge_number: self.challenge_count,
            challenge_title: title.trim().to_string(),
            difficulty: difficulty.trim().to_lowercase(),
            steps: Vec::new(),
            completion_status: CompletionStatus::NotStarted,
        });
        self.state = State::InChallenge;
    }

    fn open_step(&mut self, title: &str) {
        self.close_step();
        let ordinal = self
            .challenges
            .last()
            .map(|c| c.steps.len() as i64 + 1)
            .unwrap_or(1);
        self.step = Some(StepDraft {
            number: self.challenge_count * 100 + ordinal,
            title: title.trim().to_string(),
            ..StepDraft::default()
        });
        self.state = State::InStep;
    }

    fn line(&mut self, line: &str) {
        let trimmed = line.trim();

        // Inside a fence nothing is structural.
        if let Some(fence) = self.fence.as_mut() {
            fence.push(line.to_string());
            if is_fence(trimmed) {
                if let Some(lines) = self.fence.take() {
                    if let Some(step) = self.step.as_mut() {
                        step.fences.push(lines.join("\n"));
                    }
                }
            }
            return;
        }
        if is_fence(trimmed) {
            self.fence = Some(vec![line.to_string()]);
            return;
        }

        if let Some(caps) = self.patterns.challenge.captures(line) {
            let title = caps.get(2).map_or("", |m| m.as_str());
            let difficulty = caps.get(3).map_or("", |m| m.as_str());
            self.open_challenge(title, difficulty);
            return;
        }
        if line.starts_with("## ") {
            self.close_step();
            self.state = State::InPreamble;
            return;
        }
        if self.state == State::InPreamble {
            return;
        }
        if let Some(caps) = self.patterns.step.captures(line) {
            self.open_step(caps.get(3).map_or("", |m| m.as_str()));
            return;
        }
        if self.state == State::InChallenge {
            return;
        }

        if trimmed.starts_with('#') {
            self.state = match heading_text(trimmed).to_lowercase().as_str() {
                "hints" => State::InHints,
                "guide references" => State::InReferences,
                _ => State::InStep,
            };
            return;
        }

        let guides = self.guides;
        let link = &self.patterns.link;
        let Some(step) = self.step.as_mut() else {
            return;
        };
        match self.state {
            State::InStep => {
                if !trimmed.is_empty() {
                    step.prose.push(trimmed.to_string());
                }
            }
            State::InHints => {
                if let Some(hint) = bullet_text(trimmed) {
                    step.hints.push(hint.to_string());
                }
            }
            State::InReferences => {
                for caps in link.captures_iter(trimmed) {
                    if let Some(target) = caps.get(2) {
                        if let Some(reference) = guide_reference(target.as_str(), guides) {
                            step.references.push(reference);
                        }
                    }
                }
            }
            State::InPreamble | State::InChallenge => {}
        }
    }

    fn finish(mut self) -> Vec<Challenge> {
        // An unterminated fence still belongs to the step it started in.
        if let Some(lines) = self.fence.take() {
            if let Some(step) = self.step.as_mut() {
                step.fences.push(lines.join("\n"));
            }
        }
        self.close_step();
        self.challenges
    }
}

fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn heading_text(trimmed: &str) -> &str {
    trimmed.trim_start_matches('#').trim()
}

fn bullet_text(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Normalize one guide link target to a stable id: the guide's canonical id,
/// else its slug, else the bare file stem. Non-markdown targets are ignored.
pub fn guide_reference(raw_target: &str, guides: &dyn GuideLookup) -> Option<String> {
    // `[text](path "title")`
    let without_title = match raw_target.find(" \"") {
        Some(pos) if raw_target.ends_with('"') => &raw_target[..pos],
        _ => raw_target,
    }
    .trim();
    let path = without_title
        .split(['?', '#'])
        .next()
        .unwrap_or(without_title);
    let decoded = urlencoding::decode(path)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| path.to_string());
    if !decoded.ends_with(".md") {
        return None;
    }

    if let Some(identity) = guides.lookup(&decoded) {
        if let Some(id) = identity.canonical_id.filter(|s| !s.is_empty()) {
            return Some(id);
        }
        if let Some(slug) = identity.slug.filter(|s| !s.is_empty()) {
            return Some(slug);
        }
    }
    let file_name = decoded.rsplit(['/', '\\']).next().unwrap_or(&decoded);
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Parse a project brief body into its challenges and steps.
pub fn extract_challenges(body: &str, guides: &dyn GuideLookup) -> Result<Vec<Challenge>> {
    let mut extractor = Extractor::new(guides)?;
    for line in body.lines() {
        extractor.line(line);
    }
    Ok(extractor.finish())
}

/// The `### Project Requirements` section, heading included, up to the next
/// `##`-level or deeper heading.
pub fn extract_requirements(body: &str) -> Option<String> {
    let mut lines = body.lines();
    let mut section: Vec<&str> = Vec::new();
    for line in lines.by_ref() {
        if line.trim_end() == "### Project Requirements" {
            section.push(line);
            break;
        }
    }
    if section.is_empty() {
        return None;
    }
    for line in lines {
        if line.starts_with("##") {
            break;
        }
        section.push(line);
    }
    Some(section.join("\n").trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapGuides(HashMap<String, GuideIdentity>);

    impl GuideLookup for MapGuides {
        fn lookup(&self, target: &str) -> Option<GuideIdentity> {
            self.0.get(target).cloned()
        }
    }

    const BRIEF: &str = "\
# Weather App

Intro paragraph that belongs to no challenge.

### Project Requirements
- Fetch forecasts
- Cache results

## Challenge 1: Setup (Easy)

Get the toolchain ready.

#### Step 1.1: Install SDK
Download the SDK.
Accept the licenses.
Open the project.
This fourth line is not part of the description.

```bash
sdkmanager --install platform-tools
```

### Hints
- Use the stable channel
* Check your PATH

### Guide References
- [Setup guide](../guides/01.%20Setup.md#install)
- [External](https://developer.android.com)

#### Step 1.2: First Build
Run the build.

## Challenge 2: Networking (Medium)

#### Step 2.1: Fetch data
Call the API.
";

    #[test]
    fn test_single_challenge_single_step() {
        let body = "## Challenge 1: Setup (Easy)\n#### Step 1.1: Install SDK\nDo it.\n";
        let challenges = extract_challenges(body, &NoGuides).unwrap();
        assert_eq!(challenges.len(), 1);
        assert_eq!(challenges[0].challenge_number, 1);
        assert_eq!(challenges[0].difficulty, "easy");
        assert_eq!(challenges[0].steps.len(), 1);
        assert_eq!(challenges[0].steps[0].number, 101);
        assert_eq!(challenges[0].steps[0].title, "Install SDK");
    }

    #[test]
    fn test_full_brief() {
        let challenges = extract_challenges(BRIEF, &NoGuides).unwrap();
        assert_eq!(challenges.len(), 2);

        let setup = &challenges[0];
        assert_eq!(setup.challenge_title, "Setup");
        assert_eq!(setup.completion_status, CompletionStatus::NotStarted);
        assert_eq!(setup.steps.len(), 2);

        let install = &setup.steps[0];
        assert_eq!(install.number, 101);
        assert_eq!(
            install.description,
            "Download the SDK. Accept the licenses. Open the project."
        );
        assert_eq!(
            install.hints.as_deref(),
            Some(&["Use the stable channel".to_string(), "Check your PATH".to_string()][..])
        );
        assert_eq!(install.guide_references, vec!["01. Setup".to_string()]);
        let code = install.code_examples.as_deref().unwrap();
        assert!(code.starts_with("```bash"));
        assert!(code.contains("sdkmanager --install platform-tools"));

        let build = &setup.steps[1];
        assert_eq!(build.number, 102);
        assert_eq!(build.description, "Run the build.");
        assert!(build.hints.is_none());
        assert!(build.code_examples.is_none());

        let networking = &challenges[1];
        assert_eq!(networking.challenge_number, 2);
        assert_eq!(networking.difficulty, "medium");
        assert_eq!(networking.steps[0].number, 201);
    }

    #[test]
    fn test_older_step_heading_variant() {
        let body = "## Challenge 1: Setup (Easy)\n### Step 1.1: Old style\ntext\n### Step 1.2: Next\n";
        let challenges = extract_challenges(body, &NoGuides).unwrap();
        let numbers: Vec<i64> = challenges[0].steps.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![101, 102]);
    }

    #[test]
    fn test_challenge_without_steps() {
        let body = "## Challenge 1: Planning (Hard)\nJust think about it.\n";
        let challenges = extract_challenges(body, &NoGuides).unwrap();
        assert_eq!(challenges.len(), 1);
        assert!(challenges[0].steps.is_empty());
        assert_eq!(challenges[0].difficulty, "hard");
    }

    #[test]
    fn test_heading_without_difficulty_is_skipped() {
        let body = "## Challenge 1: Setup (Easy)\n#### Step 1.1: Go\n\
                    ## Challenge 2: Freestyle\n#### Step 2.1: Ignored\n\
                    ## Challenge 3: Ship (Hard)\n#### Step 3.1: Release\n";
        let challenges = extract_challenges(body, &NoGuides).unwrap();
        assert_eq!(challenges.len(), 2);
        assert_eq!(challenges[0].steps.len(), 1);
        // The skipped section does not advance the numbering.
        assert_eq!(challenges[1].challenge_number, 2);
        assert_eq!(challenges[1].challenge_title, "Ship");
        assert_eq!(challenges[1].steps[0].number, 201);
    }

    #[test]
    fn test_other_section_closes_challenge() {
        let body = "## Challenge 1: Setup (Easy)\n#### Step 1.1: Go\ntext\n## Wrap-up\n#### Step 9.9: Not a step\n";
        let challenges = extract_challenges(body, &NoGuides).unwrap();
        assert_eq!(challenges[0].steps.len(), 1);
    }

    #[test]
    fn test_headings_inside_fences_are_code() {
        let body = "## Challenge 1: Setup (Easy)\n#### Step 1.1: Script\n```bash\n## Challenge 2: Fake (Hard)\n```\n";
        let challenges = extract_challenges(body, &NoGuides).unwrap();
        assert_eq!(challenges.len(), 1);
        let code = challenges[0].steps[0].code_examples.as_deref().unwrap();
        assert!(code.contains("Fake"));
    }

    #[test]
    fn test_description_truncated() {
        let long = "x".repeat(800);
        let body = format!("## Challenge 1: A (Easy)\n#### Step 1.1: Long\n{}\n", long);
        let challenges = extract_challenges(&body, &NoGuides).unwrap();
        assert_eq!(challenges[0].steps[0].description.chars().count(), DESCRIPTION_MAX_CHARS);
    }

    #[test]
    fn test_guide_reference_prefers_canonical_id_then_slug() {
        let mut map = HashMap::new();
        map.insert(
            "../guides/a.md".to_string(),
            GuideIdentity {
                canonical_id: Some("guide-a".into()),
                slug: Some("a-slug".into()),
            },
        );
        map.insert(
            "../guides/b.md".to_string(),
            GuideIdentity {
                canonical_id: None,
                slug: Some("b-slug".into()),
            },
        );
        let guides = MapGuides(map);
        assert_eq!(guide_reference("../guides/a.md", &guides).as_deref(), Some("guide-a"));
        assert_eq!(guide_reference("../guides/b.md?x=1", &guides).as_deref(), Some("b-slug"));
        assert_eq!(guide_reference("../guides/c.md", &guides).as_deref(), Some("c"));
        assert_eq!(guide_reference("https://example.com", &guides), None);
        assert_eq!(
            guide_reference("../guides/14.%20Android%20Services.md \"Services\"", &guides).as_deref(),
            Some("14. Android Services")
        );
        assert_eq!(
            guide_reference("../guides/14. Android Services.md", &guides).as_deref(),
            Some("14. Android Services")
        );
    }

    #[test]
    fn test_extract_requirements() {
        let req = extract_requirements(BRIEF).unwrap();
        assert!(req.starts_with("### Project Requirements"));
        assert!(req.contains("- Cache results"));
        assert!(!req.contains("Challenge"));
        assert!(extract_requirements("## Challenge 1: A (Easy)\n").is_none());
    }
}
