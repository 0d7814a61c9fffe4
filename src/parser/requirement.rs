use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TraceError;
use crate::graph::EdgeKind;
use crate::pattern::EngineConfig;

use super::{parse_assertion_scoped_field, ContentKind, DocParser, ParsedAssertion, ParsedContent};

// Grounded directly on the regexes in
// `examples/original_source/src/elspais/core/parser.py`.
pub(crate) static HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#*\s*(?P<id>[A-Z]+-[A-Za-z0-9-]+):\s*(?P<title>.+)$").unwrap());

static IMPLEMENTS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\*{0,2}Implements\*{0,2}\s*:\s*(?P<ids>.+)$").unwrap()
});

static REFINES_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Refines\*{0,2}\s*:\s*(?P<ids>.+)$").unwrap());

static ADDRESSES_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Addresses\*{0,2}\s*:\s*(?P<ids>.+)$").unwrap());

static RATIONALE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Rationale\*{0,2}\s*:\s*(?P<text>.+)$").unwrap());

static ACCEPTANCE_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\*{0,2}Acceptance Criteria\*{0,2}\s*:?\s*$").unwrap());

static ASSERTIONS_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^##\s+Assertions\s*$").unwrap());

static ASSERTION_LINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Z0-9]+)\.\s+(.+)$").unwrap());

/// An indented, non-blank line inside an assertions block that isn't an
/// assertion line of its own: a wrapped continuation of the assertion
/// directly above it (`spec.md` §3, assertion continuation lines).
static CONTINUATION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s+\S").unwrap());

pub(crate) static END_MARKER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*End\*\s+\*[^*]+\*\s*(?:\|\s*\*\*Hash\*\*:\s*(?P<hash>[a-zA-Z0-9]+))?").unwrap()
});

static BULLET_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*]\s+(.+)$").unwrap());

/// Parses `## Assertions`-bearing requirement blocks out of Markdown spec
/// files: heading, metadata lines (`Implements`/`Refines`/`Addresses`/
/// `Rationale`), legacy `Acceptance Criteria` bullets, the assertions list,
/// and the trailing `*End*` marker with its optional content hash.
///
/// Behavior is a direct port of `RequirementParser.parse_text` in
/// `examples/original_source/src/elspais/core/parser.py`, re-expressed as a
/// single forward line scan instead of the original's multi-regex sequence.
pub struct RequirementParser;

impl DocParser for RequirementParser {
    fn applies_to(&self, path: &Path, _config: &EngineConfig) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("md"))
    }

    fn parse(
        &self,
        path: &Path,
        text: &str,
        config: &EngineConfig,
    ) -> (Vec<ParsedContent>, Vec<TraceError>) {
        let lines: Vec<&str> = text.lines().collect();
        let mut contents = Vec::new();
        let mut errors = Vec::new();

        let mut i = 0;
        while i < lines.len() {
            let Some(caps) = HEADER_PATTERN.captures(lines[i]) else {
                i += 1;
                continue;
            };
            let id = caps.name("id").unwrap().as_str().to_string();
            if !config.id_pattern.is_valid(&id) {
                i += 1;
                continue;
            }
            let title = caps.name("title").unwrap().as_str().trim().to_string();
            let start_line = i + 1;

            // Block extends to the next header line, `*End*` marker, or EOF.
            let mut end = i + 1;
            while end < lines.len()
                && !HEADER_PATTERN.is_match(lines[end])
                && !END_MARKER_PATTERN.is_match(lines[end].trim())
            {
                end += 1;
            }
            let block_end_exclusive = end;
            let recorded_hash = if end < lines.len() {
                END_MARKER_PATTERN
                    .captures(lines[end].trim())
                    .and_then(|c| c.name("hash"))
                    .map(|m| m.as_str().to_string())
            } else {
                None
            };
            let end_line = if end < lines.len() { end + 1 } else { block_end_exclusive };

            match parse_block(&id, &title, &lines[i + 1..block_end_exclusive], i + 2, config) {
                Ok(mut parsed) => {
                    parsed.start_line = start_line;
                    parsed.end_line = end_line;
                    parsed.recorded_hash = recorded_hash;
                    contents.push(parsed);
                }
                Err(err) => errors.push(TraceError::ParseError {
                    file: path.display().to_string(),
                    line: start_line,
                    message: err,
                }),
            }

            i = end_line.max(i + 1);
        }

        (contents, errors)
    }
}

fn parse_block(
    id: &str,
    title: &str,
    body_lines: &[&str],
    body_start_line: usize,
    config: &EngineConfig,
) -> Result<ParsedContent, String> {
    let mut content = ParsedContent::new(ContentKind::Requirement, title);
    content.id = Some(id.to_string());

    let mut references = Vec::new();
    let mut body_text_lines: Vec<&str> = Vec::new();
    let mut assertions: Vec<ParsedAssertion> = Vec::new();
    let mut in_assertions = false;
    let mut in_acceptance = false;

    for (offset, line) in body_lines.iter().enumerate() {
        let lineno = body_start_line + offset;
        let line = *line;

        if ASSERTIONS_HEADER_PATTERN.is_match(line) {
            in_assertions = true;
            in_acceptance = false;
            continue;
        }
        if in_assertions {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with("##") || line.trim() == "---" {
                in_assertions = false;
            } else if let Some(caps) = ASSERTION_LINE_PATTERN.captures(line) {
                let label = caps.get(1).unwrap().as_str().to_string();
                let text = caps.get(2).unwrap().as_str().trim().to_string();
                let is_placeholder = config.is_placeholder_text(&text);
                assertions.push(ParsedAssertion {
                    label,
                    text,
                    is_placeholder,
                    line: lineno,
                });
                continue;
            } else if CONTINUATION_PATTERN.is_match(line) && !assertions.is_empty() {
                let last = assertions.last_mut().unwrap();
                if !last.text.is_empty() {
                    last.text.push(' ');
                }
                last.text.push_str(line.trim());
                continue;
            } else {
                in_assertions = false;
            }
        }

        if ACCEPTANCE_HEADER_PATTERN.is_match(line) {
            in_acceptance = true;
            continue;
        }
        if in_acceptance {
            if let Some(caps) = BULLET_PATTERN.captures(line) {
                let entry = caps.get(1).unwrap().as_str().trim().to_string();
                let existing = content.content.entry("acceptance_criteria".to_string()).or_default();
                if !existing.is_empty() {
                    existing.push('\n');
                }
                existing.push_str(&entry);
                continue;
            } else if !line.trim().is_empty() {
                in_acceptance = false;
            }
        }

        if let Some(caps) = IMPLEMENTS_PATTERN.captures(line) {
            references.extend(parse_assertion_scoped_field(
                caps.name("ids").unwrap().as_str(),
                EdgeKind::Implements,
                config,
            ));
            continue;
        }
        if let Some(caps) = REFINES_PATTERN.captures(line) {
            references.extend(parse_assertion_scoped_field(
                caps.name("ids").unwrap().as_str(),
                EdgeKind::Refines,
                config,
            ));
            continue;
        }
        if let Some(caps) = ADDRESSES_PATTERN.captures(line) {
            references.extend(parse_assertion_scoped_field(
                caps.name("ids").unwrap().as_str(),
                EdgeKind::Addresses,
                config,
            ));
            continue;
        }
        if let Some(caps) = RATIONALE_PATTERN.captures(line) {
            content
                .content
                .insert("rationale".to_string(), caps.name("text").unwrap().as_str().trim().to_string());
            continue;
        }

        body_text_lines.push(line);
    }

    // Trim trailing blank lines, matching `_extract_body`.
    while matches!(body_text_lines.last(), Some(l) if l.trim().is_empty()) {
        body_text_lines.pop();
    }
    content.body_text = body_text_lines
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    content.assertions = assertions;
    content.references = references;

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_header_implements_and_assertions() {
        let text = "\
# REQ-p00001: Track assertions

**Implements**: -

Body text here.

## Assertions

A. The system does a thing.
B. obsolete placeholder text.

*End* *REQ-p00001* | **Hash**: abc123
";
        let config = EngineConfig::default();
        let parser = RequirementParser;
        let (contents, errors) = parser.parse(&PathBuf::from("spec.md"), text, &config);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(contents.len(), 1);
        let req = &contents[0];
        assert_eq!(req.id.as_deref(), Some("REQ-p00001"));
        assert_eq!(req.assertions.len(), 2);
        assert!(!req.assertions[0].is_placeholder);
        assert!(req.assertions[1].is_placeholder);
        assert_eq!(req.recorded_hash.as_deref(), Some("abc123"));
        assert!(req.references.is_empty());
    }

    #[test]
    fn splits_multiple_implements_targets() {
        let text = "\
# REQ-o00001: Child

**Implements**: REQ-p00001, REQ-p00002

Body.
";
        let config = EngineConfig::default();
        let parser = RequirementParser;
        let (contents, _) = parser.parse(&PathBuf::from("spec.md"), text, &config);
        assert_eq!(contents[0].references.len(), 2);
    }

    #[test]
    fn assertion_continuation_lines_append_to_prior_assertion() {
        let text = "\
# REQ-p00001: Wrapped assertion

## Assertions

A. The system does a thing
   that wraps onto a second line.
B. A short one.

*End* *REQ-p00001*
";
        let config = EngineConfig::default();
        let parser = RequirementParser;
        let (contents, errors) = parser.parse(&PathBuf::from("spec.md"), text, &config);
        assert!(errors.is_empty());
        assert_eq!(contents[0].assertions.len(), 2);
        assert_eq!(
            contents[0].assertions[0].text,
            "The system does a thing that wraps onto a second line."
        );
        assert_eq!(contents[0].assertions[0].line, 4);
    }
}
