//! Structural consistency checks.
//!
//! Walks the whole tree from the root and verifies:
//! - every leaf sits at the same depth
//! - node occupancy stays within the order bounds (the root is exempt)
//! - keys are strictly increasing and inside the range their parent allows
//! - each separator equals the smallest key of the subtree to its right
//! - id signs match node kinds
//! - the leaf chain visits every leaf left to right and ends in the null id
//! - the entry count matches the tree's length

use crate::btree::node::{Node, NodeId};
use crate::btree::store::NodeStore;
use crate::btree::tree::{BPlusTree, TreeError, TreeState};
use crate::holder::Holder;

/// Leaves seen during the walk, in key order.
struct Walk {
    leaves: Vec<(NodeId, NodeId)>,
    entries: usize,
}

impl<K: Holder, V: Holder, S: NodeStore<K, V>> BPlusTree<K, V, S> {
    /// Verify every structural invariant.
    ///
    /// A violation marks the tree invalid and is returned as
    /// `TreeError::CorruptionDetected`.
    pub fn check_invariants(&self) -> Result<(), TreeError> {
        let state = self.read_state()?;
        let mut walk = Walk {
            leaves: Vec::new(),
            entries: 0,
        };

        self.check_node(&state, &mut walk, state.root, 0, None, None)
            .map_err(|message| self.corruption(message))?;

        for pair in walk.leaves.windows(2) {
            let (id, next) = pair[0];
            if next != pair[1].0 {
                return Err(self.corruption(format!(
                    "leaf {id} links to {next}, expected {}",
                    pair[1].0
                )));
            }
        }
        if let Some(&(id, next)) = walk.leaves.last() {
            if !next.is_null() {
                return Err(self.corruption(format!("last leaf {id} links to {next}")));
            }
        }
        if walk.entries != state.len {
            return Err(self.corruption(format!(
                "found {} entries, tree records {}",
                walk.entries, state.len
            )));
        }
        Ok(())
    }

    /// Check the subtree at `id` and return its smallest key.
    ///
    /// Keys must lie in `[lower, upper)`.
    fn check_node(
        &self,
        state: &TreeState,
        walk: &mut Walk,
        id: NodeId,
        depth: usize,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<Option<K>, String> {
        let is_root = depth == 0;
        let node = self.store.get(id).map_err(|e| format!("node {id}: {e}"))?;
        if node.id() != id {
            return Err(format!("node stored under {id} reports id {}", node.id()));
        }

        let keys = match &node {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        };
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!("keys of node {id} are not strictly increasing"));
        }
        if let (Some(lower), Some(first)) = (lower, keys.first()) {
            if first < lower {
                return Err(format!("node {id} holds {first:?} below bound {lower:?}"));
            }
        }
        if let (Some(upper), Some(last)) = (upper, keys.last()) {
            if last >= upper {
                return Err(format!("node {id} holds {last:?} at or above bound {upper:?}"));
            }
        }

        match node {
            Node::Leaf(leaf) => {
                if !id.is_leaf() {
                    return Err(format!("leaf stored under non-leaf id {id}"));
                }
                if depth + 1 != state.height {
                    return Err(format!(
                        "leaf {id} at depth {depth}, expected {}",
                        state.height - 1
                    ));
                }
                if leaf.keys.len() != leaf.values.len() {
                    return Err(format!("leaf {id} has mismatched keys and values"));
                }
                if leaf.len() > self.order.leaf {
                    return Err(format!("leaf {id} holds {} keys", leaf.len()));
                }
                if !is_root && leaf.len() < self.order.min_leaf() {
                    return Err(format!("leaf {id} is underfull with {} keys", leaf.len()));
                }
                walk.leaves.push((id, leaf.next));
                walk.entries += leaf.len();
                Ok(leaf.keys.first().cloned())
            }
            Node::Internal(node) => {
                if !id.is_internal() {
                    return Err(format!("internal node stored under non-internal id {id}"));
                }
                let children = node.children.len();
                if children != node.keys.len() + 1 {
                    return Err(format!(
                        "internal node {id} has {} keys and {children} children",
                        node.keys.len()
                    ));
                }
                if children > self.order.internal {
                    return Err(format!("internal node {id} has {children} children"));
                }
                let min = if is_root { 2 } else { self.order.min_internal() };
                if children < min {
                    return Err(format!("internal node {id} is underfull with {children} children"));
                }

                let mut smallest = None;
                for (i, &child) in node.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { node.keys.get(i - 1) };
                    let child_upper = node.keys.get(i).or(upper);
                    let child_min =
                        self.check_node(state, walk, child, depth + 1, child_lower, child_upper)?;

                    if i == 0 {
                        smallest = child_min;
                    } else if child_min.as_ref() != node.keys.get(i - 1) {
                        return Err(format!(
                            "separator {:?} of node {id} does not match subtree minimum {child_min:?}",
                            node.keys[i - 1]
                        ));
                    }
                }
                Ok(smallest)
            }
        }
    }
}
