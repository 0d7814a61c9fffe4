//! [C3] The graph model: nodes, edges, and traversal over the
//! requirement/assertion/journey/code/test hierarchy.
//!
//! Grounded on `BidGraph`/`BeliefGraph`
//! (`examples/buildonomy-noet-core/src/beliefbase/graph.rs`): an owned
//! node map plus adjacency, `union`/`paginate`-style accessors, and
//! DFS-based subtree collection, adapted from petgraph-backed belief IDs
//! to plain string requirement IDs.

mod core;
mod edge;
mod node;
mod walk;

pub use core::{BrokenReference, Graph};
pub use edge::{Edge, EdgeKind};
pub use node::{Node, NodeKind};
pub use walk::Order;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> Graph {
        let mut g = Graph::new();
        g.insert_node(Node::new("REQ-p00001", NodeKind::Requirement, "Root"));
        g.insert_node(Node::new("REQ-o00001", NodeKind::Requirement, "Child A"));
        g.insert_node(Node::new("REQ-o00002", NodeKind::Requirement, "Child B"));
        g.insert_node(Node::new("REQ-d00001", NodeKind::Requirement, "Grandchild"));
        g.add_edge_raw(Edge::new("REQ-o00001", "REQ-p00001", EdgeKind::Implements))
            .unwrap();
        g.add_edge_raw(Edge::new("REQ-o00002", "REQ-p00001", EdgeKind::Implements))
            .unwrap();
        g.add_edge_raw(Edge::new("REQ-d00001", "REQ-o00001", EdgeKind::Implements))
            .unwrap();
        g
    }

    #[test]
    fn roots_have_no_outgoing_tree_edge() {
        let g = sample_graph();
        let roots: Vec<&str> = g.iter_roots().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["REQ-p00001"]);
    }

    #[test]
    fn walk_preorder_visits_each_node_once() {
        let g = sample_graph();
        let visited = g.walk("REQ-p00001", Order::PreOrder);
        assert_eq!(visited.len(), 4);
        assert_eq!(visited[0].id, "REQ-p00001");
    }

    #[test]
    fn walk_postorder_visits_children_before_parent() {
        let g = sample_graph();
        let visited = g.walk("REQ-p00001", Order::PostOrder);
        let pos = |id: &str| visited.iter().position(|n| n.id == id).unwrap();
        assert!(pos("REQ-d00001") < pos("REQ-o00001"));
        assert!(pos("REQ-o00001") < pos("REQ-p00001"));
    }

    #[test]
    fn ancestors_reaches_root() {
        let g = sample_graph();
        let ancestors: Vec<&str> = g.ancestors("REQ-d00001").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ancestors, vec!["REQ-o00001", "REQ-p00001"]);
    }

    #[test]
    fn would_cycle_detects_self_and_back_edges() {
        let g = sample_graph();
        assert!(g.would_cycle("REQ-p00001", "REQ-d00001"));
        assert!(!g.would_cycle("REQ-p00001", "REQ-o00002"));
    }

    #[test]
    fn broken_reference_tracked_until_node_exists() {
        let mut g = sample_graph();
        g.add_edge_raw(Edge::new("REQ-o00002", "REQ-p09999", EdgeKind::Implements))
            .unwrap();
        let broken = g.broken_references();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].target_id, "REQ-p09999");
        assert_eq!(broken[0].source_id, "REQ-o00002");
        assert_eq!(broken[0].kind, EdgeKind::Implements);

        g.insert_node(Node::new("REQ-p09999", NodeKind::Requirement, "Now exists"));
        assert!(g.broken_references().is_empty());
    }
}
