// This module implements the Analyzer that computes block layout information for a lowered
// function. It performs a reverse post-order (RPO) traversal from the entry node using an
// explicit stack of (node, processed) pairs and a visited set, so loops are walked once and
// unreachable nodes (the dead cursors left behind by break/continue/return) are excluded.
// Alongside the order it records every reachable node's predecessors. The storage allocator
// and the emitter walk nodes in this order, lowering uses reachability to decide whether the
// function tail can fall off the end, and the init check uses predecessors for its dataflow.

use crate::ir::{Cfg, NodeId};
use hashbrown::{HashMap, HashSet};

/// Block layout of a function's reachable nodes.
#[derive(Debug, Default, Clone)]
pub struct Analyzer {
    order: Vec<NodeId>,
    position: HashMap<NodeId, usize>,
    preds: HashMap<NodeId, Vec<NodeId>>,
}

impl Analyzer {
    /// Build the layout for the nodes reachable from `entry`.
    pub fn new(cfg: &Cfg, entry: NodeId) -> Self {
        // -------- build RPO order ---------
        let mut post = Vec::new();
        let mut stack = vec![(entry, false)];
        let mut visited = HashSet::new();
        while let Some((node, processed)) = stack.pop() {
            if processed {
                post.push(node);
                continue;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.push((node, true));
            // Reversed so the first successor is explored first.
            for succ in cfg.successors(node).into_iter().rev() {
                stack.push((succ, false));
            }
        }
        post.reverse();

        let position = post.iter().enumerate().map(|(idx, n)| (*n, idx)).collect();

        // -------- predecessors ---------
        let mut preds: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for &node in &post {
            for succ in cfg.successors(node) {
                let entry = preds.entry(succ).or_default();
                if !entry.contains(&node) {
                    entry.push(node);
                }
            }
        }

        Self { order: post, position, preds }
    }

    /// Reachable nodes in reverse post order; the entry comes first.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.position.contains_key(&node)
    }

    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.position.get(&node).copied()
    }

    /// Reachable predecessors of `node`.
    pub fn predecessors(&self, node: NodeId) -> &[NodeId] {
        self.preds.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessor_count(&self, node: NodeId) -> usize {
        self.predecessors(node).len()
    }
}
