use std::collections::BTreeSet;

use super::core::Graph;
use super::node::Node;

/// Traversal order for [`Graph::walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    PreOrder,
    PostOrder,
    /// Breadth-first, level by level from the given root.
    LevelOrder,
}

impl Graph {
    /// Walk the tree rooted at `root_id` in the given order, following
    /// `is_tree_edge` edges from parent to child. The graph is a DAG, not
    /// necessarily a tree, so a node reachable via two parents is visited
    /// once; the `visited` set dedups by node id (`spec.md` I3).
    pub fn walk(&self, root_id: &str, order: Order) -> Vec<&Node> {
        match order {
            Order::PreOrder => self.walk_pre(root_id),
            Order::PostOrder => self.walk_post(root_id),
            Order::LevelOrder => self.walk_level(root_id),
        }
    }

    fn walk_pre(&self, root_id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![root_id.to_string()];
        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if let Some(node) = self.find_by_id(&id) {
                out.push(node);
            }
            let mut children: Vec<String> =
                self.iter_children(&id).map(|n| n.id.clone()).collect();
            children.sort();
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    fn walk_post(&self, root_id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        self.walk_post_inner(root_id, &mut visited, &mut out);
        out
    }

    fn walk_post_inner<'a>(
        &'a self,
        id: &str,
        visited: &mut BTreeSet<String>,
        out: &mut Vec<&'a Node>,
    ) {
        if !visited.insert(id.to_string()) {
            return;
        }
        let mut children: Vec<String> = self.iter_children(id).map(|n| n.id.clone()).collect();
        children.sort();
        for child in &children {
            self.walk_post_inner(child, visited, out);
        }
        if let Some(node) = self.find_by_id(id) {
            out.push(node);
        }
    }

    fn walk_level(&self, root_id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        let mut frontier = vec![root_id.to_string()];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for id in &frontier {
                if !visited.insert(id.clone()) {
                    continue;
                }
                if let Some(node) = self.find_by_id(id) {
                    out.push(node);
                }
                let mut children: Vec<String> =
                    self.iter_children(id).map(|n| n.id.clone()).collect();
                children.sort();
                next.extend(children);
            }
            frontier = next;
        }
        out
    }

    /// Ancestors of `id`, nearest first, following tree-edge parents.
    /// Stops at the first root reached on each branch; dedups by id.
    pub fn ancestors(&self, id: &str) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        visited.insert(id.to_string());
        while let Some(current) = stack.pop() {
            let mut parents: Vec<String> =
                self.iter_parents(&current).map(|n| n.id.clone()).collect();
            parents.sort();
            for parent in parents {
                if visited.insert(parent.clone()) {
                    if let Some(node) = self.find_by_id(&parent) {
                        out.push(node);
                    }
                    stack.push(parent);
                }
            }
        }
        out
    }

    /// Post-order fold over the subtree rooted at `root_id`: each node is
    /// folded only after all of its children have been folded, so the
    /// accumulator can summarize a node from its children's summaries
    /// (e.g. rolling up coverage counts).
    pub fn accumulate<T, F>(&self, root_id: &str, init: T, mut fold: F) -> T
    where
        T: Clone,
        F: FnMut(&Node, &[T]) -> T,
    {
        let mut cache: std::collections::BTreeMap<String, T> = std::collections::BTreeMap::new();
        for node in self.walk_post(root_id) {
            let child_values: Vec<T> = self
                .iter_children(&node.id)
                .filter_map(|c| cache.get(&c.id).cloned())
                .collect();
            let value = fold(node, &child_values);
            cache.insert(node.id.clone(), value);
        }
        cache.get(root_id).cloned().unwrap_or(init)
    }
}
