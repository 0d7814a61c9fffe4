//! [C4] The graph builder: turns a tree of parsed files into an assembled,
//! order-independent [`Graph`] (`spec.md` §5).
//!
//! Grounded on the two-phase "collect then resolve" shape of
//! `DocumentCompiler` (`examples/buildonomy-noet-core/src/codec/compiler.rs`),
//! simplified from its multi-pass reparse-queue design to a single pass
//! since this engine has no forward-reference ordering problem: all nodes
//! are created before any reference is resolved.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, TraceError};
use crate::graph::{BrokenReference, EdgeKind, Graph, Node, NodeKind};
use crate::parser::{ContentKind, ParsedContent, ParserRegistry};
use crate::pattern::{EngineConfig, HashMode};

/// Summary of a completed build: per-file parse errors, IDs whose recorded
/// `**Hash**:` no longer matches their computed hash, and the structural
/// anomalies the builder detected (`spec.md` §5 step 5).
#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    pub parse_errors: Vec<TraceError>,
    pub stale_hashes: Vec<String>,
    pub broken_references: Vec<BrokenReference>,
    pub orphaned_ids: Vec<String>,
    /// Total `expected-broken-links` tolerance declared across all scanned
    /// files. Not subtracted from `broken_references`: callers compare the
    /// two counts themselves (`spec.md` §3 "expected-broken-links marker").
    pub expected_broken_references: usize,
}

pub struct GraphBuilder<'a> {
    config: &'a EngineConfig,
    parsers: ParserRegistry,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        GraphBuilder {
            config,
            parsers: ParserRegistry::new(),
        }
    }

    /// Walk `root` recursively, parse every file, and assemble a [`Graph`].
    pub fn build_dir(&self, root: &Path) -> Result<(Graph, BuildReport)> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();
        self.build_files(&files)
    }

    /// Assemble a [`Graph`] from an explicit, pre-sorted file list. Used
    /// directly by tests and by [`crate::replayer::DiskReplayer`], which
    /// already knows the relevant file set.
    pub fn build_files(&self, files: &[PathBuf]) -> Result<(Graph, BuildReport)> {
        let mut report = BuildReport::default();
        let mut graph = Graph::new();

        // Step 1-2: parse every file, collect nodes and reference candidates.
        let mut parsed_by_file: Vec<(PathBuf, Vec<ParsedContent>)> = Vec::new();
        for file in files {
            let text = match std::fs::read_to_string(file) {
                Ok(t) => t,
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "failed to read file");
                    report.parse_errors.push(TraceError::from(err));
                    continue;
                }
            };
            let (contents, errors) = self.parsers.parse_file(file, &text, self.config);
            report.parse_errors.extend(errors);
            parsed_by_file.push((file.clone(), contents));
        }

        let mut pending_edges: Vec<(String, crate::parser::ReferenceCandidate)> = Vec::new();

        for (file, contents) in &parsed_by_file {
            for parsed in contents {
                self.create_nodes(&mut graph, file, parsed, &mut pending_edges, &mut report);
            }
        }

        // Step 3: resolve reference candidates, checking for cycles on tree
        // edges only (spec.md I4, open question b).
        for (source_id, candidate) in pending_edges {
            if candidate.kind.is_tree_edge() && graph.would_cycle(&source_id, &candidate.target_id) {
                report.parse_errors.push(TraceError::CycleDetected {
                    source: source_id,
                    target: candidate.target_id,
                });
                continue;
            }
            let edge = crate::graph::Edge::new(source_id, candidate.target_id, candidate.kind)
                .with_assertion_targets(candidate.assertion_targets);
            graph.add_edge_raw(edge)?;
        }

        // Step 4: compute and compare hashes.
        let ids: Vec<String> = graph
            .nodes_by_kind(NodeKind::Requirement)
            .map(|n| n.id.clone())
            .collect();
        for id in ids {
            let computed = self.compute_hash(&graph, &id);
            let recorded = graph.find_by_id(&id).and_then(|n| n.content.get("recorded_hash").cloned());
            if let Some(recorded) = recorded {
                if recorded != computed {
                    report.stale_hashes.push(id.clone());
                }
            }
            if let Some(node) = graph.find_by_id_mut(&id) {
                node.hash = Some(computed);
            }
        }

        // Step 5: classify structural anomalies.
        report.broken_references = graph.broken_references();
        report.orphaned_ids = graph.orphaned_ids();

        debug!(
            nodes = graph.node_count(),
            errors = report.parse_errors.len(),
            "build complete"
        );

        Ok((graph, report))
    }

    fn create_nodes(
        &self,
        graph: &mut Graph,
        file: &Path,
        parsed: &ParsedContent,
        pending_edges: &mut Vec<(String, crate::parser::ReferenceCandidate)>,
        report: &mut BuildReport,
    ) {
        match parsed.content_type {
            ContentKind::Requirement => {
                let Some(id) = &parsed.id else { return };
                if graph.has_node(id) {
                    report
                        .parse_errors
                        .push(TraceError::DuplicateId(id.clone()));
                    return;
                }
                let mut node = Node::new(id.clone(), NodeKind::Requirement, parsed.title.clone())
                    .with_body(parsed.body_text.clone())
                    .with_location(file.to_path_buf(), parsed.start_line, parsed.end_line);
                node.content = parsed.content.clone();
                if let Some(hash) = &parsed.recorded_hash {
                    node.content.insert("recorded_hash".to_string(), hash.clone());
                }
                graph.insert_node(node);

                for assertion in &parsed.assertions {
                    let assertion_id = self.config.id_pattern.assertion_id(id, &assertion.label);
                    let mut a_node = Node::new(assertion_id.clone(), NodeKind::Assertion, assertion.label.clone())
                        .with_body(assertion.text.clone())
                        .with_location(file.to_path_buf(), assertion.line, assertion.line);
                    a_node.content.insert(
                        "is_placeholder".to_string(),
                        assertion.is_placeholder.to_string(),
                    );
                    graph.insert_node(a_node);
                    let _ = graph.add_edge_raw(crate::graph::Edge::new(
                        assertion_id,
                        id.clone(),
                        EdgeKind::Contains,
                    ));
                }

                for reference in &parsed.references {
                    pending_edges.push((id.clone(), reference.clone()));
                }
            }
            ContentKind::Journey => {
                let Some(id) = &parsed.id else { return };
                if graph.has_node(id) {
                    return;
                }
                let mut node = Node::new(id.clone(), NodeKind::Journey, parsed.title.clone())
                    .with_body(parsed.body_text.clone())
                    .with_location(file.to_path_buf(), parsed.start_line, parsed.end_line);
                node.content = parsed.content.clone();
                graph.insert_node(node);
                for reference in &parsed.references {
                    pending_edges.push((id.clone(), reference.clone()));
                }
            }
            ContentKind::File => {
                let Some(id) = &parsed.id else { return };
                if graph.has_node(id) {
                    return;
                }
                let node = Node::new(id.clone(), NodeKind::File, parsed.title.clone())
                    .with_location(file.to_path_buf(), parsed.start_line, parsed.end_line);
                graph.insert_node(node);
            }
            ContentKind::FileRegion => {
                let Some(id) = &parsed.id else { return };
                if graph.has_node(id) {
                    return;
                }
                let mut node = Node::new(id.clone(), NodeKind::FileRegion, parsed.title.clone())
                    .with_location(file.to_path_buf(), parsed.start_line, parsed.end_line);
                node.content = parsed.content.clone();
                graph.insert_node(node);
                if let Some(file_id) = graph
                    .find_by_id(&format!("FILE:{}", file.display()))
                    .map(|n| n.id.clone())
                {
                    let _ = graph.add_edge_raw(crate::graph::Edge::new(id.clone(), file_id, EdgeKind::Contains));
                }
            }
            ContentKind::CodeSymbol => {
                let Some(id) = &parsed.id else { return };
                let node = Node::new(id.clone(), NodeKind::CodeSymbol, parsed.title.clone())
                    .with_location(file.to_path_buf(), parsed.start_line, parsed.end_line);
                graph.insert_node(node);
                for reference in &parsed.references {
                    pending_edges.push((id.clone(), reference.clone()));
                }
            }
            ContentKind::Test => {
                let Some(id) = &parsed.id else { return };
                let node = Node::new(id.clone(), NodeKind::Test, parsed.title.clone())
                    .with_location(file.to_path_buf(), parsed.start_line, parsed.end_line);
                graph.insert_node(node);
                for reference in &parsed.references {
                    pending_edges.push((id.clone(), reference.clone()));
                }
            }
            ContentKind::Remainder => {
                if let Some(count) = parsed
                    .content
                    .get("expected_broken_links")
                    .and_then(|v| v.parse::<usize>().ok())
                {
                    report.expected_broken_references += count;
                }
            }
        }
    }

    /// Compute a requirement's content hash according to the configured
    /// [`HashMode`] (`spec.md` I6, decided in `SPEC_FULL.md` §11(a)).
    fn compute_hash(&self, graph: &Graph, requirement_id: &str) -> String {
        let mut hasher = Sha256::new();
        match self.config.hash_mode {
            HashMode::FullText => {
                if let Some(node) = graph.find_by_id(requirement_id) {
                    hasher.update(node.body_text.as_bytes());
                }
            }
            HashMode::NormalizedText => {
                let mut labels: Vec<&Node> = graph.iter_children(requirement_id).collect();
                labels.sort_by(|a, b| a.title.cmp(&b.title));
                for assertion in labels {
                    hasher.update(assertion.title.trim_end().as_bytes());
                    hasher.update(b". ");
                    hasher.update(assertion.body_text.trim_end().as_bytes());
                    hasher.update(b"\n");
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}
