use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, TraceError};
use crate::mutation::MutationLog;

use super::edge::{Edge, EdgeKind};
use super::node::{Node, NodeKind};

/// A dangling `Implements:`/`Refines:`/`Addresses:`/`Validates:` reference:
/// an edge whose target id has no corresponding node. One entry per
/// assertion label an edge names, so `Validates: REQ-p00001-A, B` against a
/// missing `REQ-p00001` surfaces as two entries rather than one opaque id
/// (`spec.md` §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenReference {
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    pub assertion_label: Option<String>,
}

/// The traceability graph: an owned map of nodes keyed by ID, a per-kind
/// index for fast kind-scoped iteration, adjacency lists for forward and
/// reverse traversal, and the mutation log recording every change made
/// since the graph was built (`spec.md` §4.3-§4.5).
///
/// Mirrors the index/dirty-flag shape of `BeliefBase`
/// (`examples/buildonomy-noet-core/src/beliefbase/base.rs`), simplified to
/// plain owned fields since the engine is single-threaded (`spec.md` §5).
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
    by_kind: BTreeMap<NodeKind, BTreeSet<String>>,
    outgoing: BTreeMap<String, Vec<Edge>>,
    incoming: BTreeMap<String, Vec<Edge>>,
    /// Nodes removed by a cascade-aware mutation (`delete_requirement`,
    /// assertion compaction) but kept around so the removal can be undone
    /// byte-for-byte (`spec.md` §6 I7).
    tombstones: BTreeMap<String, Node>,
    pub(crate) mutation_log: MutationLog,
}

impl Default for Graph {
    fn default() -> Self {
        Graph {
            nodes: BTreeMap::new(),
            by_kind: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
            tombstones: BTreeMap::new(),
            mutation_log: MutationLog::new(),
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // -- node access ---------------------------------------------------

    pub fn find_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes_by_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(move |id| self.nodes.get(id))
    }

    pub fn count_by_kind(&self, kind: NodeKind) -> usize {
        self.by_kind.get(&kind).map(|s| s.len()).unwrap_or(0)
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Roots are requirement nodes with no outgoing tree edge (nothing they
    /// implement/refine/address): top of the hierarchy (`spec.md` I2).
    pub fn iter_roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes_by_kind(NodeKind::Requirement).filter(move |n| {
            self.outgoing
                .get(&n.id)
                .map(|edges| !edges.iter().any(|e| e.kind.is_tree_edge()))
                .unwrap_or(true)
        })
    }

    pub fn has_root(&self) -> bool {
        self.iter_roots().next().is_some()
    }

    /// Nodes removed by a cascade-aware mutation, most recently tombstoned
    /// first is not guaranteed; order follows id, matching `nodes_by_kind`.
    pub fn deleted_nodes(&self) -> impl Iterator<Item = &Node> {
        self.tombstones.values()
    }

    pub fn has_deletions(&self) -> bool {
        !self.tombstones.is_empty()
    }

    // -- edge access -----------------------------------------------------

    pub fn iter_outgoing_edges(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.outgoing.get(id).into_iter().flat_map(|v| v.iter())
    }

    pub fn iter_incoming_edges(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.incoming.get(id).into_iter().flat_map(|v| v.iter())
    }

    /// Children of `id` in the tree sense: nodes whose tree edge targets
    /// `id` (i.e. nodes that implement/refine/address it, or assertions it
    /// has).
    pub fn iter_children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.iter_incoming_edges(id)
            .filter(|e| e.kind.is_tree_edge())
            .filter_map(move |e| self.nodes.get(&e.source))
    }

    /// Parents of `id`: the nodes `id` implements/refines/addresses, or the
    /// requirement an assertion belongs to.
    pub fn iter_parents<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.iter_outgoing_edges(id)
            .filter(|e| e.kind.is_tree_edge())
            .filter_map(move |e| self.nodes.get(&e.target))
    }

    /// Every edge whose target id is absent from the node index: a
    /// dangling `Implements:`/`Validates:` target (`spec.md` §4.4). One
    /// `BrokenReference` per assertion label an unscoped edge names, or a
    /// single label-less entry if the edge scopes none.
    pub fn broken_references(&self) -> Vec<BrokenReference> {
        let mut broken = Vec::new();
        for edges in self.outgoing.values() {
            for e in edges {
                if self.nodes.contains_key(&e.target) {
                    continue;
                }
                if e.assertion_targets.is_empty() {
                    broken.push(BrokenReference {
                        source_id: e.source.clone(),
                        target_id: e.target.clone(),
                        kind: e.kind,
                        assertion_label: None,
                    });
                } else {
                    for label in &e.assertion_targets {
                        broken.push(BrokenReference {
                            source_id: e.source.clone(),
                            target_id: e.target.clone(),
                            kind: e.kind,
                            assertion_label: Some(label.clone()),
                        });
                    }
                }
            }
        }
        broken.sort_by(|a, b| {
            (a.source_id.as_str(), a.target_id.as_str(), a.assertion_label.as_deref())
                .cmp(&(b.source_id.as_str(), b.target_id.as_str(), b.assertion_label.as_deref()))
        });
        broken
    }

    /// Requirement/assertion IDs with no incoming or outgoing tree edge and
    /// that are not roots: unreachable from any root (`spec.md` §4.4).
    pub fn orphaned_ids(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Requirement | NodeKind::Assertion))
            .filter(|n| {
                let no_out = !self
                    .outgoing
                    .get(&n.id)
                    .map(|e| e.iter().any(|e| e.kind.is_tree_edge()))
                    .unwrap_or(false);
                let no_in = !self
                    .incoming
                    .get(&n.id)
                    .map(|e| e.iter().any(|e| e.kind.is_tree_edge()))
                    .unwrap_or(false);
                no_out && no_in && n.kind == NodeKind::Requirement
            })
            .map(|n| n.id.clone())
            .collect()
    }

    // -- raw mutators, used only by `crate::builder` and `crate::mutation` --

    pub(crate) fn insert_node(&mut self, node: Node) {
        self.by_kind.entry(node.kind).or_default().insert(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        if let Some(set) = self.by_kind.get_mut(&node.kind) {
            set.remove(id);
        }
        Some(node)
    }

    /// Remove `id` from the live graph and retain it in the tombstone store
    /// so it can be restored byte-for-byte by `unmark_deleted`. A no-op if
    /// `id` isn't currently live.
    pub(crate) fn mark_deleted(&mut self, id: &str) {
        if let Some(mut node) = self.remove_node(id) {
            node.deleted = true;
            self.tombstones.insert(id.to_string(), node);
        }
    }

    /// Restore a previously tombstoned node to the live graph. Returns
    /// `false` if `id` wasn't tombstoned.
    pub(crate) fn unmark_deleted(&mut self, id: &str) -> bool {
        let Some(mut node) = self.tombstones.remove(id) else {
            return false;
        };
        node.deleted = false;
        self.insert_node(node);
        true
    }

    pub(crate) fn add_edge_raw(&mut self, edge: Edge) -> Result<()> {
        let key = edge.key();
        if self
            .outgoing
            .get(&edge.source)
            .map(|v| v.iter().any(|e| e.key() == key))
            .unwrap_or(false)
        {
            return Ok(());
        }
        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .push(edge.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .push(edge);
        Ok(())
    }

    pub(crate) fn remove_edge_raw(&mut self, source: &str, target: &str, kind: EdgeKind) {
        if let Some(v) = self.outgoing.get_mut(source) {
            v.retain(|e| !(e.target == target && e.kind == kind));
        }
        if let Some(v) = self.incoming.get_mut(target) {
            v.retain(|e| !(e.source == source && e.kind == kind));
        }
    }

    /// All edges touching `id`, either direction, removed and returned so a
    /// cascade delete can restore them on undo.
    pub(crate) fn remove_all_edges_of(&mut self, id: &str) -> Vec<Edge> {
        let mut removed = Vec::new();
        if let Some(v) = self.outgoing.remove(id) {
            for edge in &v {
                if let Some(inc) = self.incoming.get_mut(&edge.target) {
                    inc.retain(|e| !(e.source == id && e.kind == edge.kind));
                }
            }
            removed.extend(v);
        }
        if let Some(v) = self.incoming.remove(id) {
            for edge in &v {
                if let Some(out) = self.outgoing.get_mut(&edge.source) {
                    out.retain(|e| !(e.target == id && e.kind == edge.kind));
                }
            }
            removed.extend(v);
        }
        removed
    }

    /// Would adding `source -> target` create a cycle among tree edges?
    /// Only tree edges participate in cycle detection (`spec.md` §9, open
    /// question b: renames can't introduce cycles, so only `add_edge`
    /// checks this).
    pub(crate) fn would_cycle(&self, source: &str, target: &str) -> bool {
        if source == target {
            return true;
        }
        let mut stack = vec![target.to_string()];
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == source {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            for edge in self.iter_outgoing_edges(&current) {
                if edge.kind.is_tree_edge() {
                    stack.push(edge.target.clone());
                }
            }
        }
        false
    }

    pub fn require_node(&self, id: &str) -> Result<&Node> {
        self.find_by_id(id)
            .ok_or_else(|| TraceError::NotFound(id.to_string()))
    }
}
