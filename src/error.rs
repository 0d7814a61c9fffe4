use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error kinds surfaced by the traceability engine. See `spec.md` §7.
///
/// Parsers and the builder accumulate `ParseError` per file rather than
/// raising it; mutation operations raise synchronously and leave the graph
/// unchanged; the replayer aggregates per-file errors into a single report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum TraceError {
    #[error("id '{0}' already exists")]
    DuplicateId(String),

    #[error("id '{0}' not found")]
    NotFound(String),

    #[error("expected node of kind {expected}, found {found} for '{id}'")]
    InvalidKind {
        id: String,
        expected: String,
        found: String,
    },

    #[error("edge {source} -> {target} would create a cycle")]
    CycleDetected { source: String, target: String },

    #[error("no such edge {source} -> {target}")]
    NoSuchEdge { source: String, target: String },

    #[error("destructive operation on '{0}' requires confirmation")]
    ConfirmRequired(String),

    #[error("spec file(s) modified on disk since graph build: {0:?}")]
    Conflict(Vec<String>),

    #[error("parse error in {file}:{line}: {message}")]
    ParseError {
        file: String,
        line: usize,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid pattern: {0}")]
    Regex(String),
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TraceError::NotFound(format!("{err}")),
            _ => TraceError::Io(format!("{err}")),
        }
    }
}

impl From<toml::de::Error> for TraceError {
    fn from(err: toml::de::Error) -> Self {
        TraceError::Serialization(format!("toml deserialization failed: {err}"))
    }
}

impl From<toml::ser::Error> for TraceError {
    fn from(err: toml::ser::Error) -> Self {
        TraceError::Serialization(format!("toml serialization failed: {err}"))
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(err: serde_json::Error) -> Self {
        TraceError::Serialization(format!("json (de)serialization failed: {err}"))
    }
}

impl From<regex::Error> for TraceError {
    fn from(err: regex::Error) -> Self {
        TraceError::Regex(format!("{err}"))
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
