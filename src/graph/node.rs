use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of node carried in the graph. Distinct from [`crate::pattern::TypeCode`],
/// which only classifies requirements by hierarchy level: `NodeKind` spans every
/// entity the parsers produce (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Requirement,
    Assertion,
    Journey,
    File,
    /// A textual span of a file outside any requirement block — preamble,
    /// inter-requirement gap, or postamble — used by the replayer to locate
    /// precise insertion points (`spec.md` §3, §4.2.3).
    FileRegion,
    CodeSymbol,
    Test,
    /// The outcome of a single test run, linked to its test via a
    /// `Produces` edge.
    TestResult,
    External,
    /// A span of a file the parsers found no structure in at all — a file
    /// with no requirement headers, no code annotations, nothing.
    Remainder,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Requirement => "requirement",
            NodeKind::Assertion => "assertion",
            NodeKind::Journey => "journey",
            NodeKind::File => "file",
            NodeKind::FileRegion => "file_region",
            NodeKind::CodeSymbol => "code_symbol",
            NodeKind::Test => "test",
            NodeKind::TestResult => "test_result",
            NodeKind::External => "external",
            NodeKind::Remainder => "remainder",
        }
    }
}

/// A single entity in the traceability graph: a requirement, one of its
/// assertions, a user journey, a source file region, a code symbol, a test,
/// or an external (broken-reference) placeholder.
///
/// `content` carries supplemental fields that don't warrant their own struct
/// member: legacy `rationale`/`acceptance_criteria` text, a `subdir` tag for
/// roadmap/archive partitioning, and similar free-form metadata (`spec.md` §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub title: String,
    pub body_text: String,
    pub content: HashMap<String, String>,
    pub hash: Option<String>,
    pub source_file: Option<PathBuf>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    /// True once this node's requirement block has been superseded by a
    /// tombstone mutation; retained for history/undo rather than removed
    /// outright (`spec.md` §6, mutation op `delete_requirement`).
    pub deleted: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind, title: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            kind,
            title: title.into(),
            body_text: String::new(),
            content: HashMap::new(),
            hash: None,
            source_file: None,
            start_line: None,
            end_line: None,
            deleted: false,
        }
    }

    pub fn with_body(mut self, body_text: impl Into<String>) -> Self {
        self.body_text = body_text.into();
        self
    }

    pub fn with_location(mut self, file: PathBuf, start_line: usize, end_line: usize) -> Self {
        self.source_file = Some(file);
        self.start_line = Some(start_line);
        self.end_line = Some(end_line);
        self
    }

    pub fn is_placeholder(&self, placeholder_values: &[String]) -> bool {
        let lower = self.body_text.trim().to_lowercase();
        placeholder_values
            .iter()
            .any(|p| lower.starts_with(&p.to_lowercase()))
    }
}
