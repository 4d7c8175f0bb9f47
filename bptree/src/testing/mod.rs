//! Shared helpers for unit tests.

use crate::btree::{BPlusTree, NodeStore};
use crate::config::TreeConfig;
use crate::holder::{Holder, IntHolder};

/// Create an in-memory `IntHolder -> IntHolder` tree with a fixed order.
pub fn int_tree(order: usize) -> BPlusTree<IntHolder, IntHolder> {
    BPlusTree::with_defaults(TreeConfig::fixed_order(order)).expect("create tree")
}

/// Collect every entry of the tree in scan order.
pub fn entries<K: Holder, V: Holder, S: NodeStore<K, V>>(tree: &BPlusTree<K, V, S>) -> Vec<(K, V)> {
    tree.iter()
        .expect("iter")
        .collect::<Result<Vec<_>, _>>()
        .expect("scan")
}

/// Collect the raw integer keys of an `IntHolder`-keyed tree.
pub fn int_keys<V: Holder, S: NodeStore<IntHolder, V>>(tree: &BPlusTree<IntHolder, V, S>) -> Vec<i32> {
    entries(tree).into_iter().map(|(k, _)| k.0).collect()
}
