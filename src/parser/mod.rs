//! [C2] Parsers: turn spec files and source files into [`ParsedContent`]
//! records the builder (`crate::builder`) assembles into a [`crate::graph::Graph`].
//!
//! Each sub-parser accumulates [`TraceError::ParseError`] per malformed
//! block rather than aborting the whole file, matching
//! `RequirementParser.parse_file`'s best-effort behavior in
//! `examples/original_source/src/elspais/core/parser.py`.

mod code;
mod file_structure;
mod journey;
mod requirement;
mod test_scanner;

pub use code::CodeParser;
pub use file_structure::FileStructureParser;
pub use journey::JourneyParser;
pub use requirement::RequirementParser;
pub use test_scanner::TestScannerParser;

use std::collections::HashMap;
use std::path::Path;

use crate::error::TraceError;
use crate::graph::EdgeKind;
use crate::pattern::EngineConfig;

/// What kind of entity a [`ParsedContent`] record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Requirement,
    Journey,
    /// A whole-file identity node, one per file the builder walks.
    File,
    /// A sub-span of a file outside any requirement block: preamble,
    /// inter-requirement gap, or postamble.
    FileRegion,
    CodeSymbol,
    Test,
    /// A marker record carrying metadata the builder consumes but that
    /// doesn't become a node of its own, e.g. an
    /// `elspais: expected-broken-links <N>` tolerance comment.
    Remainder,
}

/// A single assertion line parsed from a requirement's `## Assertions`
/// section: a short label and its text, per
/// `RequirementParser._extract_assertions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAssertion {
    pub label: String,
    pub text: String,
    pub is_placeholder: bool,
    /// Absolute line number of the assertion's own line (not a
    /// continuation line), used by the replayer to target it directly.
    pub line: usize,
}

/// One parsed entity, ready for [`crate::builder::GraphBuilder`] to turn
/// into nodes and reference candidates. A single file produces any number
/// of these (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub content_type: ContentKind,
    pub id: Option<String>,
    pub title: String,
    pub body_text: String,
    pub assertions: Vec<ParsedAssertion>,
    /// IDs this content implements/refines/addresses (requirements), or
    /// validates (tests). Kind-specific interpretation happens in the
    /// builder.
    pub references: Vec<ReferenceCandidate>,
    pub content: HashMap<String, String>,
    pub start_line: usize,
    pub end_line: usize,
    /// The `**Hash**:` value read from an end marker, if present, used by
    /// the builder to detect stale hashes (`spec.md` I6).
    pub recorded_hash: Option<String>,
}

impl ParsedContent {
    pub fn new(content_type: ContentKind, title: impl Into<String>) -> Self {
        ParsedContent {
            content_type,
            id: None,
            title: title.into(),
            body_text: String::new(),
            assertions: Vec::new(),
            references: Vec::new(),
            content: HashMap::new(),
            start_line: 0,
            end_line: 0,
            recorded_hash: None,
        }
    }
}

/// A single reference discovered in a parsed block: the kind of relation,
/// the target requirement id, and the assertion labels the reference was
/// scoped to, if any (e.g. `Validates: REQ-p00001-A, B, C` produces one
/// candidate targeting `REQ-p00001` with `assertion_targets: ["A", "B", "C"]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceCandidate {
    pub kind: EdgeKind,
    pub target_id: String,
    pub assertion_targets: Vec<String>,
}

/// Implemented by each sub-parser. Parsers never raise: malformed input
/// becomes an entry in the returned error vector, and parsing continues
/// with the rest of the file (`spec.md` §3 "Parsers accumulate errors").
pub trait DocParser {
    /// Whether this parser should run against `path` at all, based on
    /// extension or directory (e.g. the test scanner only looks under
    /// `EngineConfig::test_scanner`'s configured directories).
    fn applies_to(&self, path: &Path, config: &EngineConfig) -> bool;

    fn parse(
        &self,
        path: &Path,
        text: &str,
        config: &EngineConfig,
    ) -> (Vec<ParsedContent>, Vec<TraceError>);
}

/// Runs every registered parser over a file and aggregates results. Parsers
/// are independent of each other and of file order (`spec.md` §5 "builder
/// is order-independent").
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocParser + Send + Sync>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        ParserRegistry {
            parsers: vec![
                Box::new(FileStructureParser),
                Box::new(RequirementParser),
                Box::new(JourneyParser),
                Box::new(CodeParser),
                Box::new(TestScannerParser),
            ],
        }
    }
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_file(
        &self,
        path: &Path,
        text: &str,
        config: &EngineConfig,
    ) -> (Vec<ParsedContent>, Vec<TraceError>) {
        let mut contents = Vec::new();
        let mut errors = Vec::new();
        for parser in &self.parsers {
            if !parser.applies_to(path, config) {
                continue;
            }
            let (mut c, mut e) = parser.parse(path, text, config);
            contents.append(&mut c);
            errors.append(&mut e);
        }
        (contents, errors)
    }
}

/// Parse a comma-separated reference field into one [`ReferenceCandidate`]
/// per target requirement, grouping bare trailing assertion labels (`B`,
/// `C`) under whichever full id (`REQ-p00001`, `REQ-p00001-A`) preceded
/// them, e.g. `REQ-p00001-A, B, C` becomes one candidate targeting
/// `REQ-p00001` with `assertion_targets: ["A", "B", "C"]` (`spec.md` §3
/// "Edge.assertion_targets"). Configured "no reference" sentinels are
/// dropped; tokens that are neither a valid id nor a valid bare label are
/// silently skipped, matching the "unknown keyword never errors" contract.
pub(crate) fn parse_assertion_scoped_field(
    field: &str,
    kind: EdgeKind,
    config: &EngineConfig,
) -> Vec<ReferenceCandidate> {
    let mut out: Vec<ReferenceCandidate> = Vec::new();
    for token in field.split(',') {
        let token = token.trim();
        if token.is_empty() || config.is_no_reference_value(token) {
            continue;
        }
        if let Some(parsed) = config.id_pattern.parse_id(token) {
            let target_id = config
                .id_pattern
                .requirement_id_of(token)
                .unwrap_or_else(|| token.to_string());
            let mut candidate = ReferenceCandidate {
                kind,
                target_id,
                assertion_targets: Vec::new(),
            };
            if let Some(label) = parsed.assertion_label {
                candidate.assertion_targets.push(label);
            }
            out.push(candidate);
        } else if config.id_pattern.is_valid_label(token) {
            if let Some(last) = out.last_mut() {
                last.assertion_targets.push(token.to_string());
            }
        }
    }
    out
}
