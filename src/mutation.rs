//! [C5] The mutation engine: graph-editing operations, each recorded to an
//! append-only log with a computed inverse so every change can be undone
//! and redone byte-for-byte (`spec.md` §6, I7).
//!
//! The log shape (monotonic entry ids, full invertibility) is grounded on
//! `BeliefEvent`'s change taxonomy
//! (`examples/buildonomy-noet-core/src/event.rs`), adapted from a pub/sub
//! notification enum to a replayable undo/redo stack since this engine has
//! no live cache-sync layer to notify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};
use crate::graph::{Edge, EdgeKind, Graph, Node, NodeKind};
use crate::pattern::IdPattern;

/// A supported graph edit. Every variant has a well-defined inverse,
/// computed at apply time and stored alongside the forward op in the log
/// (`spec.md` I7). `RestoreRequirementCascade` and `RestoreAssertionCascade`
/// are internal-only: they exist solely as the computed inverse of
/// `DeleteRequirement`/`RemoveAssertion` and are never constructed
/// directly by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationOp {
    CreateRequirement {
        id: String,
        title: String,
        body_text: String,
        level: Option<u8>,
        status: Option<String>,
        parent_id: Option<String>,
        edge_kind: Option<EdgeKind>,
    },
    DeleteRequirement {
        id: String,
    },
    /// Internal inverse of `DeleteRequirement`: restores the requirement,
    /// every assertion it carried, and every edge that touched either, all
    /// in one step (`spec.md` §6 "delete cascades to assertions").
    RestoreRequirementCascade {
        id: String,
        assertion_ids: Vec<String>,
        edges: Vec<Edge>,
    },
    RenameRequirement {
        old_id: String,
        new_id: String,
    },
    RenameAssertion {
        old_id: String,
        new_id: String,
    },
    UpdateTitle {
        id: String,
        title: String,
    },
    UpdateBody {
        id: String,
        body_text: String,
    },
    AddAssertion {
        requirement_id: String,
        label: String,
        text: String,
    },
    RemoveAssertion {
        assertion_id: String,
        /// Whether the remaining assertions should be relabeled to close
        /// the gap (`spec.md` §6 "assertion compaction"). The caller
        /// chooses; compaction is not automatic, since it renames sibling
        /// ids and any reference that named them by label would dangle.
        compact: bool,
    },
    /// Internal inverse of `RemoveAssertion`: restores the removed
    /// assertion and its edges, and undoes whatever compaction renames
    /// `RemoveAssertion` performed, in that order.
    RestoreAssertionCascade {
        assertion_id: String,
        requirement_id: String,
        compact: bool,
        edges: Vec<Edge>,
        renames: Vec<(String, String)>,
    },
    UpdateAssertion {
        assertion_id: String,
        text: String,
    },
    AddEdge {
        source: String,
        target: String,
        kind: EdgeKind,
        assertion_targets: Vec<String>,
    },
    RemoveEdge {
        source: String,
        target: String,
        kind: EdgeKind,
    },
    ChangeEdgeKind {
        source: String,
        target: String,
        old_kind: EdgeKind,
        new_kind: EdgeKind,
    },
    FixBrokenReference {
        source: String,
        old_target: String,
        new_target: String,
        kind: EdgeKind,
    },
    SetContent {
        id: String,
        key: String,
        value: Option<String>,
    },
    ChangeStatus {
        id: String,
        status: Option<String>,
    },
}

/// A single logged mutation: the forward op as applied, its inverse, and
/// when it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub op: MutationOp,
    pub inverse: MutationOp,
}

/// Append-only history of applied mutations plus an undo/redo cursor.
/// Entries are never removed by undo: undoing moves the cursor back and
/// pushes onto the redo stack; applying a new mutation while the cursor is
/// not at the tip truncates the redo stack, matching ordinary editor undo
/// semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationLog {
    entries: Vec<MutationEntry>,
    redo_stack: Vec<MutationEntry>,
    next_id: u64,
}

impl MutationLog {
    pub fn new() -> Self {
        MutationLog::default()
    }

    pub fn entries(&self) -> &[MutationEntry] {
        &self.entries
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    fn record(&mut self, op: MutationOp, inverse: MutationOp, now: DateTime<Utc>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.redo_stack.clear();
        self.entries.push(MutationEntry {
            id,
            timestamp: now,
            op,
            inverse,
        });
        id
    }
}

impl Graph {
    pub fn mutation_log_entries(&self) -> &[MutationEntry] {
        self.mutation_log.entries()
    }

    pub fn can_undo(&self) -> bool {
        self.mutation_log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.mutation_log.can_redo()
    }

    /// Apply a mutation, recording it (and its inverse) to the log. On
    /// error the graph is left unchanged (`spec.md` §6 "mutations raise
    /// synchronously").
    pub fn apply(&mut self, op: MutationOp, id_pattern: &IdPattern, now: DateTime<Utc>) -> Result<u64> {
        let inverse = self.apply_forward(&op, id_pattern)?;
        Ok(self.mutation_log.record(op, inverse, now))
    }

    pub fn undo(&mut self, id_pattern: &IdPattern) -> Result<bool> {
        let Some(entry) = self.mutation_log.entries.pop() else {
            return Ok(false);
        };
        self.apply_forward(&entry.inverse, id_pattern)?;
        self.mutation_log.redo_stack.push(entry);
        Ok(true)
    }

    pub fn redo(&mut self, id_pattern: &IdPattern) -> Result<bool> {
        let Some(entry) = self.mutation_log.redo_stack.pop() else {
            return Ok(false);
        };
        self.apply_forward(&entry.op, id_pattern)?;
        self.mutation_log.entries.push(entry);
        Ok(true)
    }

    /// Apply `op` to the graph and return its inverse, without touching the
    /// log. Shared by `apply`, `undo` (applies `entry.inverse`), and `redo`
    /// (re-applies `entry.op`).
    fn apply_forward(&mut self, op: &MutationOp, id_pattern: &IdPattern) -> Result<MutationOp> {
        match op {
            MutationOp::CreateRequirement {
                id,
                title,
                body_text,
                level,
                status,
                parent_id,
                edge_kind,
            } => {
                if self.has_node(id) {
                    return Err(TraceError::DuplicateId(id.clone()));
                }
                let kind = edge_kind.unwrap_or(EdgeKind::Implements);
                if let Some(parent) = parent_id {
                    if kind.is_tree_edge() && self.would_cycle(id, parent) {
                        return Err(TraceError::CycleDetected {
                            source: id.clone(),
                            target: parent.clone(),
                        });
                    }
                }
                let mut node =
                    Node::new(id.clone(), NodeKind::Requirement, title.clone()).with_body(body_text.clone());
                if let Some(level) = level {
                    node.content.insert("level".to_string(), level.to_string());
                }
                if let Some(status) = status {
                    node.content.insert("status".to_string(), status.clone());
                }
                self.insert_node(node);
                if let Some(parent) = parent_id {
                    self.add_edge_raw(Edge::new(id.clone(), parent.clone(), kind))?;
                }
                Ok(MutationOp::DeleteRequirement { id: id.clone() })
            }
            MutationOp::DeleteRequirement { id } => {
                self.require_node(id)?;
                let assertion_ids: Vec<String> = self
                    .iter_children(id)
                    .filter(|n| n.kind == NodeKind::Assertion)
                    .map(|n| n.id.clone())
                    .collect();

                let mut edges = self.remove_all_edges_of(id);
                for assertion_id in &assertion_ids {
                    edges.extend(self.remove_all_edges_of(assertion_id));
                }
                self.mark_deleted(id);
                for assertion_id in &assertion_ids {
                    self.mark_deleted(assertion_id);
                }

                Ok(MutationOp::RestoreRequirementCascade {
                    id: id.clone(),
                    assertion_ids,
                    edges,
                })
            }
            MutationOp::RestoreRequirementCascade { id, assertion_ids, edges } => {
                if !self.unmark_deleted(id) {
                    return Err(TraceError::NotFound(id.clone()));
                }
                for assertion_id in assertion_ids {
                    self.unmark_deleted(assertion_id);
                }
                for edge in edges {
                    self.add_edge_raw(edge.clone())?;
                }
                Ok(MutationOp::DeleteRequirement { id: id.clone() })
            }
            MutationOp::RenameRequirement { old_id, new_id } => {
                self.rename_requirement(old_id, new_id, id_pattern)
            }
            MutationOp::RenameAssertion { old_id, new_id } => {
                self.require_node(old_id)?;
                if self.has_node(new_id) {
                    return Err(TraceError::DuplicateId(new_id.clone()));
                }
                let label = id_pattern
                    .parse_id(new_id)
                    .and_then(|p| p.assertion_label)
                    .unwrap_or_else(|| new_id.clone());
                self.rename_assertion_raw(old_id, new_id, &label);
                Ok(MutationOp::RenameAssertion {
                    old_id: new_id.clone(),
                    new_id: old_id.clone(),
                })
            }
            MutationOp::UpdateTitle { id, title } => {
                let node = self.find_by_id_mut(id).ok_or_else(|| TraceError::NotFound(id.clone()))?;
                let prior = std::mem::replace(&mut node.title, title.clone());
                Ok(MutationOp::UpdateTitle { id: id.clone(), title: prior })
            }
            MutationOp::UpdateBody { id, body_text } => {
                let node = self.find_by_id_mut(id).ok_or_else(|| TraceError::NotFound(id.clone()))?;
                let prior = std::mem::replace(&mut node.body_text, body_text.clone());
                Ok(MutationOp::UpdateBody { id: id.clone(), body_text: prior })
            }
            MutationOp::AddAssertion { requirement_id, label, text } => {
                self.require_node(requirement_id)?;
                let assertion_id = id_pattern.assertion_id(requirement_id, label);
                if self.has_node(&assertion_id) {
                    return Err(TraceError::DuplicateId(assertion_id));
                }
                self.insert_node(
                    Node::new(assertion_id.clone(), NodeKind::Assertion, label.clone()).with_body(text.clone()),
                );
                self.add_edge_raw(Edge::new(assertion_id.clone(), requirement_id.clone(), EdgeKind::Contains))?;
                Ok(MutationOp::RemoveAssertion {
                    assertion_id,
                    compact: false,
                })
            }
            MutationOp::RemoveAssertion { assertion_id, compact } => {
                self.require_node(assertion_id)?;
                let requirement_id = self
                    .iter_parents(assertion_id)
                    .next()
                    .map(|n| n.id.clone())
                    .ok_or_else(|| TraceError::NotFound(assertion_id.clone()))?;

                let edges = self.remove_all_edges_of(assertion_id);
                self.mark_deleted(assertion_id);
                let renames = if *compact {
                    self.compact_assertion_labels(&requirement_id, id_pattern)
                } else {
                    Vec::new()
                };

                Ok(MutationOp::RestoreAssertionCascade {
                    assertion_id: assertion_id.clone(),
                    requirement_id,
                    compact: *compact,
                    edges,
                    renames,
                })
            }
            MutationOp::RestoreAssertionCascade {
                assertion_id,
                requirement_id,
                compact,
                edges,
                renames,
            } => {
                for (old_id, new_id) in renames.iter().rev() {
                    let label = id_pattern
                        .parse_id(old_id)
                        .and_then(|p| p.assertion_label)
                        .unwrap_or_else(|| old_id.clone());
                    self.rename_assertion_raw(new_id, old_id, &label);
                }
                if !self.unmark_deleted(assertion_id) {
                    return Err(TraceError::NotFound(assertion_id.clone()));
                }
                for edge in edges {
                    self.add_edge_raw(edge.clone())?;
                }
                Ok(MutationOp::RemoveAssertion {
                    assertion_id: assertion_id.clone(),
                    compact: *compact,
                })
            }
            MutationOp::UpdateAssertion { assertion_id, text } => {
                let node = self
                    .find_by_id_mut(assertion_id)
                    .ok_or_else(|| TraceError::NotFound(assertion_id.clone()))?;
                let prior = std::mem::replace(&mut node.body_text, text.clone());
                Ok(MutationOp::UpdateAssertion { assertion_id: assertion_id.clone(), text: prior })
            }
            MutationOp::AddEdge { source, target, kind, assertion_targets } => {
                self.require_node(source)?;
                if kind.is_tree_edge() && self.would_cycle(source, target) {
                    return Err(TraceError::CycleDetected {
                        source: source.clone(),
                        target: target.clone(),
                    });
                }
                let edge = Edge::new(source.clone(), target.clone(), *kind)
                    .with_assertion_targets(assertion_targets.clone());
                self.add_edge_raw(edge)?;
                Ok(MutationOp::RemoveEdge {
                    source: source.clone(),
                    target: target.clone(),
                    kind: *kind,
                })
            }
            MutationOp::RemoveEdge { source, target, kind } => {
                let assertion_targets = self
                    .iter_outgoing_edges(source)
                    .find(|e| &e.target == target && e.kind == *kind)
                    .map(|e| e.assertion_targets.clone())
                    .ok_or_else(|| TraceError::NoSuchEdge {
                        source: source.clone(),
                        target: target.clone(),
                    })?;
                self.remove_edge_raw(source, target, *kind);
                Ok(MutationOp::AddEdge {
                    source: source.clone(),
                    target: target.clone(),
                    kind: *kind,
                    assertion_targets,
                })
            }
            MutationOp::ChangeEdgeKind { source, target, old_kind, new_kind } => {
                let edge = self
                    .iter_outgoing_edges(source)
                    .find(|e| &e.target == target && e.kind == *old_kind)
                    .cloned()
                    .ok_or_else(|| TraceError::NoSuchEdge {
                        source: source.clone(),
                        target: target.clone(),
                    })?;
                self.remove_edge_raw(source, target, *old_kind);
                if new_kind.is_tree_edge() && self.would_cycle(source, target) {
                    let _ = self.add_edge_raw(edge);
                    return Err(TraceError::CycleDetected {
                        source: source.clone(),
                        target: target.clone(),
                    });
                }
                let moved = Edge::new(source.clone(), target.clone(), *new_kind)
                    .with_assertion_targets(edge.assertion_targets.clone());
                self.add_edge_raw(moved)?;
                Ok(MutationOp::ChangeEdgeKind {
                    source: source.clone(),
                    target: target.clone(),
                    old_kind: *new_kind,
                    new_kind: *old_kind,
                })
            }
            MutationOp::FixBrokenReference { source, old_target, new_target, kind } => {
                let edge = self
                    .iter_outgoing_edges(source)
                    .find(|e| &e.target == old_target && e.kind == *kind)
                    .cloned()
                    .ok_or_else(|| TraceError::NoSuchEdge {
                        source: source.clone(),
                        target: old_target.clone(),
                    })?;
                self.remove_edge_raw(source, old_target, *kind);
                if kind.is_tree_edge() && self.would_cycle(source, new_target) {
                    let _ = self.add_edge_raw(edge);
                    return Err(TraceError::CycleDetected {
                        source: source.clone(),
                        target: new_target.clone(),
                    });
                }
                let moved = Edge::new(source.clone(), new_target.clone(), *kind)
                    .with_assertion_targets(edge.assertion_targets.clone());
                self.add_edge_raw(moved)?;
                Ok(MutationOp::FixBrokenReference {
                    source: source.clone(),
                    old_target: new_target.clone(),
                    new_target: old_target.clone(),
                    kind: *kind,
                })
            }
            MutationOp::SetContent { id, key, value } => {
                let node = self.find_by_id_mut(id).ok_or_else(|| TraceError::NotFound(id.clone()))?;
                let prior = match value {
                    Some(v) => node.content.insert(key.clone(), v.clone()),
                    None => node.content.remove(key),
                };
                Ok(MutationOp::SetContent { id: id.clone(), key: key.clone(), value: prior })
            }
            MutationOp::ChangeStatus { id, status } => {
                let node = self.find_by_id_mut(id).ok_or_else(|| TraceError::NotFound(id.clone()))?;
                let prior = match status {
                    Some(v) => node.content.insert("status".to_string(), v.clone()),
                    None => node.content.remove("status"),
                };
                Ok(MutationOp::ChangeStatus { id: id.clone(), status: prior })
            }
        }
    }

    /// Rename a requirement, cascading the rename to every one of its
    /// assertion ids (e.g. `REQ-o00001-A` -> `REQ-o00010-A`) and repointing
    /// all edges that named the old id (`spec.md` §6 "rename cascade").
    fn rename_requirement(&mut self, old_id: &str, new_id: &str, id_pattern: &IdPattern) -> Result<MutationOp> {
        if !self.has_node(old_id) {
            return Err(TraceError::NotFound(old_id.to_string()));
        }
        if self.has_node(new_id) {
            return Err(TraceError::DuplicateId(new_id.to_string()));
        }

        let mut node = self.remove_node(old_id).expect("checked above");
        node.id = new_id.to_string();
        self.insert_node(node);

        let assertions: Vec<String> = self
            .iter_children(old_id)
            .filter(|n| n.kind == NodeKind::Assertion)
            .map(|n| n.id.clone())
            .collect();
        for assertion_id in assertions {
            if let Some(label) = id_pattern.parse_id(&assertion_id).and_then(|p| p.assertion_label) {
                let new_assertion_id = id_pattern.assertion_id(new_id, &label);
                self.rename_assertion_raw(&assertion_id, &new_assertion_id, &label);
            }
        }

        self.repoint_edges(old_id, new_id);
        Ok(MutationOp::RenameRequirement {
            old_id: new_id.to_string(),
            new_id: old_id.to_string(),
        })
    }

    fn repoint_edges(&mut self, old_id: &str, new_id: &str) {
        let outgoing: Vec<Edge> = self.iter_outgoing_edges(old_id).cloned().collect();
        for edge in outgoing {
            self.remove_edge_raw(&edge.source, &edge.target, edge.kind);
            let mut moved = edge;
            moved.source = new_id.to_string();
            let _ = self.add_edge_raw(moved);
        }
        let incoming: Vec<Edge> = self.iter_incoming_edges(old_id).cloned().collect();
        for edge in incoming {
            self.remove_edge_raw(&edge.source, &edge.target, edge.kind);
            let mut moved = edge;
            moved.target = new_id.to_string();
            let _ = self.add_edge_raw(moved);
        }
    }

    /// Rename a single assertion node in place, repointing every edge that
    /// touched its old id. Shared by the explicit `RenameAssertion` op,
    /// the requirement-rename cascade, and assertion-label compaction.
    fn rename_assertion_raw(&mut self, from_id: &str, to_id: &str, new_label: &str) {
        let Some(mut node) = self.remove_node(from_id) else {
            return;
        };
        node.id = to_id.to_string();
        node.title = new_label.to_string();
        self.insert_node(node);
        self.repoint_edges(from_id, to_id);
    }

    /// Relabel a requirement's remaining assertions to A, B, C, ... with no
    /// gaps, preserving relative order by prior label, and return the
    /// `(old_id, new_id)` pairs actually renamed so a cascade-aware caller
    /// can undo them in reverse (`spec.md` §6 "assertion compaction").
    fn compact_assertion_labels(&mut self, requirement_id: &str, id_pattern: &IdPattern) -> Vec<(String, String)> {
        let mut assertions: Vec<Node> = self
            .iter_children(requirement_id)
            .filter(|n| n.kind == NodeKind::Assertion)
            .cloned()
            .collect();
        assertions.sort_by(|a, b| a.title.cmp(&b.title));

        let mut renames = Vec::new();
        for (idx, node) in assertions.iter().enumerate() {
            let new_id = id_pattern.assertion_id(requirement_id, &compaction_label(idx));
            if new_id != node.id {
                renames.push((node.id.clone(), new_id));
            }
        }
        for (old_id, new_id) in &renames {
            let label = id_pattern
                .parse_id(new_id)
                .and_then(|p| p.assertion_label)
                .unwrap_or_else(|| new_id.clone());
            self.rename_assertion_raw(old_id, new_id, &label);
        }
        renames
    }
}

/// A, B, ..., Z, AA, AB, ... label sequence for compacted assertions.
fn compaction_label(index: usize) -> String {
    let mut n = index;
    let mut label = Vec::new();
    loop {
        let rem = (n % 26) as u8;
        label.push(b'A' + rem);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    label.reverse();
    String::from_utf8(label).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::IdPattern;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn create(id: &str) -> MutationOp {
        MutationOp::CreateRequirement {
            id: id.to_string(),
            title: "T".to_string(),
            body_text: "B".to_string(),
            level: None,
            status: None,
            parent_id: None,
            edge_kind: None,
        }
    }

    #[test]
    fn create_and_undo_is_byte_identical() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        let before = format!("{:?}", g.node_count());
        g.apply(create("REQ-p00001"), &pattern, now()).unwrap();
        assert!(g.has_node("REQ-p00001"));
        g.undo(&pattern).unwrap();
        assert!(!g.has_node("REQ-p00001"));
        assert_eq!(before, format!("{:?}", g.node_count()));
    }

    #[test]
    fn delete_cascades_to_assertions_and_undo_restores_them() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        g.apply(create("REQ-p00001"), &pattern, now()).unwrap();
        g.apply(
            MutationOp::AddAssertion {
                requirement_id: "REQ-p00001".to_string(),
                label: "A".to_string(),
                text: "text".to_string(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        g.apply(
            MutationOp::DeleteRequirement { id: "REQ-p00001".to_string() },
            &pattern,
            now(),
        )
        .unwrap();
        assert!(!g.has_node("REQ-p00001"));
        assert!(!g.has_node("REQ-p00001-A"));
        assert!(g.deleted_nodes().any(|n| n.id == "REQ-p00001"));
        assert!(g.deleted_nodes().any(|n| n.id == "REQ-p00001-A"));

        g.undo(&pattern).unwrap();
        assert!(g.has_node("REQ-p00001"));
        assert!(g.has_node("REQ-p00001-A"));
        assert!(g
            .iter_children("REQ-p00001")
            .any(|n| n.id == "REQ-p00001-A"));
    }

    #[test]
    fn assertion_compaction_closes_gaps_and_undo_restores_labels() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        g.apply(create("REQ-p00001"), &pattern, now()).unwrap();
        for label in ["A", "B", "C"] {
            g.apply(
                MutationOp::AddAssertion {
                    requirement_id: "REQ-p00001".to_string(),
                    label: label.to_string(),
                    text: format!("assertion {label}"),
                },
                &pattern,
                now(),
            )
            .unwrap();
        }
        g.apply(
            MutationOp::RemoveAssertion {
                assertion_id: "REQ-p00001-B".to_string(),
                compact: true,
            },
            &pattern,
            now(),
        )
        .unwrap();
        let mut labels: Vec<String> = g
            .iter_children("REQ-p00001")
            .filter(|n| n.kind == NodeKind::Assertion)
            .map(|n| n.title.clone())
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["A".to_string(), "B".to_string()]);
        assert!(!g.has_node("REQ-p00001-C"));

        g.undo(&pattern).unwrap();
        let mut labels: Vec<String> = g
            .iter_children("REQ-p00001")
            .filter(|n| n.kind == NodeKind::Assertion)
            .map(|n| n.title.clone())
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        assert!(g.has_node("REQ-p00001-C"));
    }

    #[test]
    fn rename_cascades_to_assertions() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        g.apply(create("REQ-o00001"), &pattern, now()).unwrap();
        g.apply(
            MutationOp::AddAssertion {
                requirement_id: "REQ-o00001".to_string(),
                label: "A".to_string(),
                text: "text".to_string(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        g.apply(
            MutationOp::RenameRequirement {
                old_id: "REQ-o00001".to_string(),
                new_id: "REQ-o00010".to_string(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        assert!(g.has_node("REQ-o00010-A"));
        assert!(!g.has_node("REQ-o00001-A"));
    }

    #[test]
    fn rename_assertion_repoints_edges() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        g.apply(create("REQ-o00001"), &pattern, now()).unwrap();
        g.apply(
            MutationOp::AddAssertion {
                requirement_id: "REQ-o00001".to_string(),
                label: "A".to_string(),
                text: "text".to_string(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        g.apply(
            MutationOp::RenameAssertion {
                old_id: "REQ-o00001-A".to_string(),
                new_id: "REQ-o00001-Z".to_string(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        assert!(g.has_node("REQ-o00001-Z"));
        assert!(g.iter_children("REQ-o00001").any(|n| n.id == "REQ-o00001-Z"));
    }

    #[test]
    fn add_edge_rejects_cycle() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        for id in ["REQ-p00001", "REQ-o00001"] {
            g.apply(create(id), &pattern, now()).unwrap();
        }
        g.apply(
            MutationOp::AddEdge {
                source: "REQ-o00001".to_string(),
                target: "REQ-p00001".to_string(),
                kind: EdgeKind::Implements,
                assertion_targets: Vec::new(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        let result = g.apply(
            MutationOp::AddEdge {
                source: "REQ-p00001".to_string(),
                target: "REQ-o00001".to_string(),
                kind: EdgeKind::Implements,
                assertion_targets: Vec::new(),
            },
            &pattern,
            now(),
        );
        assert!(matches!(result, Err(TraceError::CycleDetected { .. })));
    }

    #[test]
    fn change_edge_kind_rejects_cycle_and_preserves_assertion_targets() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        for id in ["REQ-p00001", "REQ-o00001"] {
            g.apply(create(id), &pattern, now()).unwrap();
        }
        g.apply(
            MutationOp::AddEdge {
                source: "REQ-o00001".to_string(),
                target: "REQ-p00001".to_string(),
                kind: EdgeKind::Validates,
                assertion_targets: vec!["A".to_string()],
            },
            &pattern,
            now(),
        )
        .unwrap();
        g.apply(
            MutationOp::ChangeEdgeKind {
                source: "REQ-o00001".to_string(),
                target: "REQ-p00001".to_string(),
                old_kind: EdgeKind::Validates,
                new_kind: EdgeKind::Implements,
            },
            &pattern,
            now(),
        )
        .unwrap();
        let edge = g
            .iter_outgoing_edges("REQ-o00001")
            .find(|e| e.target == "REQ-p00001")
            .unwrap();
        assert_eq!(edge.kind, EdgeKind::Implements);
        assert_eq!(edge.assertion_targets, vec!["A".to_string()]);
    }

    #[test]
    fn fix_broken_reference_repoints_target() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        for id in ["REQ-o00001", "REQ-p00001"] {
            g.apply(create(id), &pattern, now()).unwrap();
        }
        g.apply(
            MutationOp::AddEdge {
                source: "REQ-o00001".to_string(),
                target: "REQ-p99999".to_string(),
                kind: EdgeKind::Implements,
                assertion_targets: Vec::new(),
            },
            &pattern,
            now(),
        )
        .unwrap();
        g.apply(
            MutationOp::FixBrokenReference {
                source: "REQ-o00001".to_string(),
                old_target: "REQ-p99999".to_string(),
                new_target: "REQ-p00001".to_string(),
                kind: EdgeKind::Implements,
            },
            &pattern,
            now(),
        )
        .unwrap();
        assert!(g
            .iter_outgoing_edges("REQ-o00001")
            .any(|e| e.target == "REQ-p00001"));
    }

    #[test]
    fn change_status_records_prior_value() {
        let mut g = Graph::new();
        let pattern = IdPattern::default_requirements();
        g.apply(create("REQ-p00001"), &pattern, now()).unwrap();
        g.apply(
            MutationOp::ChangeStatus {
                id: "REQ-p00001".to_string(),
                status: Some("approved".to_string()),
            },
            &pattern,
            now(),
        )
        .unwrap();
        assert_eq!(
            g.find_by_id("REQ-p00001").unwrap().content.get("status"),
            Some(&"approved".to_string())
        );
        g.undo(&pattern).unwrap();
        assert_eq!(g.find_by_id("REQ-p00001").unwrap().content.get("status"), None);
    }
}
