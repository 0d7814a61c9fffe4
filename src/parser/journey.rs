use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TraceError;
use crate::graph::EdgeKind;
use crate::pattern::EngineConfig;

use super::{ContentKind, DocParser, ParsedContent, ReferenceCandidate};

static JOURNEY_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^##\s+Journey\s*:\s*(?P<title>.+)$").unwrap());

static STEP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s+(?:(?P<id>[A-Z]+-[A-Za-z0-9-]+)\s*:\s*)?(?P<text>.+)$").unwrap());

static ACTOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Actor\*{0,2}\s*:\s*(?P<text>.+)$").unwrap());

static GOAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Goal\*{0,2}\s*:\s*(?P<text>.+)$").unwrap());

static CONTEXT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Context\*{0,2}\s*:\s*(?P<text>.+)$").unwrap());

static EXPECTED_OUTCOME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Expected Outcome\*{0,2}\s*:\s*(?P<text>.+)$").unwrap());

/// Parses `## Journey: <title>` sections into `ParsedContent::Journey`
/// records, one per journey, with `Actor`/`Goal`/`Context`/`Expected
/// Outcome` lines captured as structured fields and each bulleted step
/// becoming an `Addresses` reference to the requirement it names — a
/// journey addresses the requirements it walks through rather than
/// implementing any one of them (`spec.md` §3, "User journeys").
pub struct JourneyParser;

impl DocParser for JourneyParser {
    fn applies_to(&self, path: &Path, _config: &EngineConfig) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("md"))
    }

    fn parse(
        &self,
        _path: &Path,
        text: &str,
        _config: &EngineConfig,
    ) -> (Vec<ParsedContent>, Vec<TraceError>) {
        let lines: Vec<&str> = text.lines().collect();
        let mut contents = Vec::new();
        let errors = Vec::new();

        let mut i = 0;
        let mut sequence = 0u32;
        while i < lines.len() {
            let Some(caps) = JOURNEY_HEADER_PATTERN.captures(lines[i]) else {
                i += 1;
                continue;
            };
            let title = caps.name("title").unwrap().as_str().trim().to_string();
            let start_line = i + 1;
            let mut end = i + 1;
            while end < lines.len()
                && !lines[end].trim_start().starts_with("## ")
                && lines[end].trim() != "---"
            {
                end += 1;
            }

            sequence += 1;
            let mut record = ParsedContent::new(ContentKind::Journey, &title);
            record.start_line = start_line;
            record.end_line = end;
            record.id = Some(format!("JNY-{}-{:03}", slugify(&title), sequence));

            let mut steps = Vec::new();
            for line in &lines[i + 1..end] {
                if let Some(c) = ACTOR_PATTERN.captures(line) {
                    record.content.insert("actor".to_string(), c["text"].trim().to_string());
                    continue;
                }
                if let Some(c) = GOAL_PATTERN.captures(line) {
                    record.content.insert("goal".to_string(), c["text"].trim().to_string());
                    continue;
                }
                if let Some(c) = CONTEXT_PATTERN.captures(line) {
                    record.content.insert("context".to_string(), c["text"].trim().to_string());
                    continue;
                }
                if let Some(c) = EXPECTED_OUTCOME_PATTERN.captures(line) {
                    record
                        .content
                        .insert("expected_outcome".to_string(), c["text"].trim().to_string());
                    continue;
                }
                if let Some(step_caps) = STEP_PATTERN.captures(line) {
                    let step_text = step_caps.name("text").unwrap().as_str().trim().to_string();
                    steps.push(step_text.clone());
                    if let Some(id) = step_caps.name("id") {
                        record.references.push(ReferenceCandidate {
                            kind: EdgeKind::Addresses,
                            target_id: id.as_str().to_string(),
                            assertion_targets: Vec::new(),
                        });
                    }
                }
            }
            record.body_text = steps.join("\n");
            contents.push(record);

            i = end.max(i + 1);
        }

        (contents, errors)
    }
}

fn slugify(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
