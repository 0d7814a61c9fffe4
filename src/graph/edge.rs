use serde::{Deserialize, Serialize};

/// The kind of relation an edge carries: exactly the six relation kinds
/// `spec.md` §3 defines (`IMPLEMENTS`, `REFINES`, `ADDRESSES`, `VALIDATES`,
/// `PRODUCES`, `CONTAINS`). Structural relations that used to have their
/// own kinds (a requirement's assertions, a file's code symbols) are
/// expressed as `Contains` edges in the child -> parent direction, the same
/// direction `Implements`/`Refines`/`Addresses` already use, so
/// `Graph::iter_children`/`iter_parents`/`walk` treat every tree edge
/// uniformly regardless of which of the four tree kinds it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// child requirement -> parent requirement it implements.
    Implements,
    /// child requirement -> parent requirement it refines (non-binding).
    Refines,
    /// child requirement -> parent requirement it partially addresses, or
    /// a journey -> the requirement it walks through.
    Addresses,
    /// test -> assertion (or whole requirement) it exercises.
    Validates,
    /// test -> the test result it produced on a given run.
    Produces,
    /// child (assertion, code symbol, test, file region) -> the
    /// requirement or file that contains it.
    Contains,
}

impl EdgeKind {
    /// Edge kinds that define the requirement hierarchy tree used by
    /// `walk`/`ancestors`/`accumulate`. `Validates`/`Produces` are
    /// auxiliary coverage links, not hierarchy links, and are excluded so a
    /// test validating many assertions can't be mistaken for their parent.
    pub fn is_tree_edge(&self) -> bool {
        matches!(
            self,
            EdgeKind::Implements | EdgeKind::Refines | EdgeKind::Addresses | EdgeKind::Contains
        )
    }

    /// Whether this edge kind counts toward assertion coverage metrics.
    pub fn is_coverage_edge(&self) -> bool {
        matches!(self, EdgeKind::Validates)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Implements => "implements",
            EdgeKind::Refines => "refines",
            EdgeKind::Addresses => "addresses",
            EdgeKind::Validates => "validates",
            EdgeKind::Produces => "produces",
            EdgeKind::Contains => "contains",
        }
    }
}

/// A directed relation between two nodes, identified by the (source,
/// target, kind) triple — parallel edges of different kinds between the
/// same pair of nodes are allowed, duplicates of the same triple are not
/// (`spec.md` I4).
///
/// `assertion_targets` scopes a `Validates` (or `Produces`) edge to
/// specific assertion labels of the target requirement, e.g. a single
/// `// Validates: REQ-p00001-A, B, C` comment produces one edge targeting
/// `REQ-p00001` with `assertion_targets: ["A", "B", "C"]`, rather than
/// three separate edges (`spec.md` §3 "Edge.assertion_targets").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub assertion_targets: Vec<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Edge {
            source: source.into(),
            target: target.into(),
            kind,
            assertion_targets: Vec::new(),
        }
    }

    pub fn with_assertion_targets(mut self, targets: Vec<String>) -> Self {
        self.assertion_targets = targets;
        self
    }

    pub fn key(&self) -> (String, String, EdgeKind) {
        (self.source.clone(), self.target.clone(), self.kind)
    }
}
