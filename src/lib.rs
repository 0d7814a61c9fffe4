//! A requirements-traceability engine.
//!
//! Parses Markdown requirement specs and annotated source/test files into a
//! typed, mutation-aware graph linking requirements, assertions, code
//! symbols, tests, and user journeys. The graph supports scoped search,
//! cursor-paginated results, and an undoable mutation log whose entries can
//! be replayed back onto the originating files.
//!
//! ```text
//! pattern (C1) -> parser (C2) -> graph (C3) -> builder (C4) -> { mutation (C5), search (C6) } -> replayer (C7)
//! ```
//!
//! Construct an [`pattern::EngineConfig`] once per run, build a graph with
//! [`builder::GraphBuilder`], then query it with [`search`] or edit it with
//! [`mutation`]. [`replayer::DiskReplayer`] projects the mutation log back
//! onto disk.

pub mod builder;
pub mod error;
pub mod graph;
pub mod mutation;
pub mod pattern;
pub mod replayer;
pub mod search;

pub use builder::{BuildReport, GraphBuilder};
pub use error::{Result, TraceError};
pub use graph::{BrokenReference, Edge, EdgeKind, Graph, Node, NodeKind, Order};
pub use mutation::{MutationEntry, MutationLog, MutationOp};
pub use pattern::EngineConfig;
pub use replayer::{DiskReplayer, FileSnapshot, ReplayReport, TextEdit};
pub use search::{
    discover_requirements, open_cursor, scoped_search, uncovered_requirements, BatchMode, Cursor, CursorInfo,
    DiscoverReport, DiscoverStats, ParsedQuery, PrunedRequirement, ScopeDirection, ScoredResult, SearchField,
    SearchOptions, SearchTerm,
};

mod parser;
