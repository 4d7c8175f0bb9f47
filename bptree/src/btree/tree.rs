//! B+Tree engine over a pluggable [`NodeStore`].
//!
//! The engine owns the root id and drives every structural change:
//! - insert with leaf and internal splits, growing a new root when needed
//! - remove with redistribution from a sibling or merging, collapsing the root
//! - ordered scans that follow leaf links
//!
//! Every operation runs under one tree-wide `RwLock`: lookups and scans share
//! it, mutations take it exclusively. A scan holds the shared lock until the
//! iterator is dropped.
//!
//! Once a structural problem is detected the tree is marked invalid and all
//! mutations fail until [`BPlusTree::clear`] resets it.

use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::btree::node::{InternalNode, LeafNode, Node, NodeId};
use crate::btree::order::Order;
use crate::btree::paged::PagedNodeStore;
use crate::btree::store::{MemoryNodeStore, NodeStore, StoreError};
use crate::config::TreeConfig;
use crate::holder::Holder;

/// Internal nodes visited on the way to a leaf, with the child index taken.
type Path = Vec<(NodeId, usize)>;

/// Mutable tree state guarded by the tree lock.
#[derive(Debug)]
pub(super) struct TreeState {
    pub(super) root: NodeId,
    pub(super) len: usize,
    /// Number of levels, 1 when the root is a leaf.
    pub(super) height: usize,
}

impl TreeState {
    const fn new(root: NodeId) -> Self {
        Self {
            root,
            len: 0,
            height: 1,
        }
    }
}

/// A B+Tree mapping `K` to `V`, with nodes kept in `S`.
pub struct BPlusTree<K, V, S = MemoryNodeStore<K, V>> {
    pub(super) store: S,
    pub(super) state: RwLock<TreeState>,
    valid: AtomicBool,
    pub(super) order: Order,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: Holder, V: Holder> BPlusTree<K, V, MemoryNodeStore<K, V>> {
    /// Create a tree with nodes resident in memory.
    pub fn in_memory(
        config: TreeConfig,
        key_blank: impl FnOnce() -> Option<K>,
        value_blank: impl FnOnce() -> Option<V>,
    ) -> Result<Self, TreeError> {
        Self::new(config, MemoryNodeStore::new(), key_blank, value_blank)
    }
}

impl<K: Holder + Default, V: Holder + Default> BPlusTree<K, V, MemoryNodeStore<K, V>> {
    /// Create an in-memory tree using `Default` for blank instances.
    pub fn with_defaults(config: TreeConfig) -> Result<Self, TreeError> {
        Self::in_memory(config, || Some(K::default()), || Some(V::default()))
    }
}

impl<K: Holder, V: Holder> BPlusTree<K, V, PagedNodeStore<K, V>> {
    /// Create a tree whose nodes are stored as encoded pages.
    pub fn paged(
        config: TreeConfig,
        key_blank: impl FnOnce() -> Option<K>,
        value_blank: impl FnOnce() -> Option<V>,
    ) -> Result<Self, TreeError> {
        let key = key_blank().ok_or(TreeError::TypeInstantiation("key"))?;
        let value = value_blank().ok_or(TreeError::TypeInstantiation("value"))?;
        let store = PagedNodeStore::new(key.clone(), value.clone());
        Self::new(config, store, || Some(key), || Some(value))
    }
}

impl<K: Holder, V: Holder, S: NodeStore<K, V>> BPlusTree<K, V, S> {
    /// Create an empty tree over `store`.
    ///
    /// The blank factories provide the size metadata used to derive the
    /// order. The store is cleared and receives a fresh empty root leaf.
    pub fn new(
        config: TreeConfig,
        store: S,
        key_blank: impl FnOnce() -> Option<K>,
        value_blank: impl FnOnce() -> Option<V>,
    ) -> Result<Self, TreeError> {
        let key = key_blank().ok_or(TreeError::TypeInstantiation("key"))?;
        let value = value_blank().ok_or(TreeError::TypeInstantiation("value"))?;
        let order = Order::tune(
            config.auto_tune,
            config.size,
            key.size_hint(),
            value.size_hint(),
        )?;

        if !store.clear() {
            return Err(TreeError::Poisoned);
        }
        let root = store.allocate(true).map_err(TreeError::Store)?;
        store
            .put(Node::Leaf(LeafNode::new(root)))
            .map_err(TreeError::Store)?;

        tracing::info!(
            "Created B+Tree: leaf_order={}, internal_order={}, auto_tune={}",
            order.leaf,
            order.internal,
            config.auto_tune
        );

        Ok(Self {
            store,
            state: RwLock::new(TreeState::new(root)),
            valid: AtomicBool::new(true),
            order,
            _marker: PhantomData,
        })
    }

    /// The node capacities in effect.
    #[must_use]
    pub const fn order(&self) -> Order {
        self.order
    }

    /// Access the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Whether the tree is known to be consistent.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Current allocation counter of the store.
    #[must_use]
    pub fn highest_id(&self) -> i32 {
        self.store.highest_id()
    }

    /// Release backend-specific resources.
    pub fn release_resources(&self) {
        self.store.release_resources();
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize, TreeError> {
        Ok(self.read_state()?.len)
    }

    pub fn is_empty(&self) -> Result<bool, TreeError> {
        Ok(self.read_state()?.len == 0)
    }

    /// Number of levels, 1 when the root is a leaf.
    pub fn height(&self) -> Result<usize, TreeError> {
        Ok(self.read_state()?.height)
    }

    /// Look up a value by key.
    pub fn get(&self, key: &K) -> Result<Option<V>, TreeError> {
        let state = self.read_state()?;
        let (leaf, _) = self.find_leaf(&state, key)?;
        Ok(leaf.get(key).cloned())
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> Result<bool, TreeError> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or update a key-value pair.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&self, key: K, value: V) -> Result<Option<V>, TreeError> {
        let mut state = self.write_state()?;
        self.ensure_valid()?;

        let (mut leaf, mut path) = self.find_leaf(&state, &key)?;

        if let Some(old) = leaf.insert(key, value) {
            self.put(Node::Leaf(leaf))?;
            return Ok(Some(old));
        }
        state.len += 1;

        if leaf.len() <= self.order.leaf {
            self.put(Node::Leaf(leaf))?;
            return Ok(None);
        }

        let right_id = self.allocate(true)?;
        let (split_key, right) = leaf.split(right_id);
        leaf.next = right_id;
        let left_id = leaf.id;
        tracing::debug!("Split leaf {left_id}, new right sibling {right_id}");

        self.put(Node::Leaf(leaf))?;
        self.put(Node::Leaf(right))?;
        self.insert_into_parent(&mut state, &mut path, left_id, split_key, right_id)?;

        Ok(None)
    }

    /// Remove a key.
    ///
    /// Returns the removed value, or None if the key was absent.
    pub fn remove(&self, key: &K) -> Result<Option<V>, TreeError> {
        let mut state = self.write_state()?;
        self.ensure_valid()?;

        let (mut leaf, path) = self.find_leaf(&state, key)?;
        let Ok(index) = leaf.find_index(key) else {
            return Ok(None);
        };

        let (removed_key, value) = leaf.remove_at(index);
        state.len -= 1;

        // The removed key may be the separator of an ancestor
        if index == 0 {
            if let Some(first) = leaf.keys.first() {
                self.replace_separator(&path, &removed_key, first.clone())?;
            }
        }

        if path.is_empty() || leaf.len() >= self.order.min_leaf() {
            self.put(Node::Leaf(leaf))?;
        } else {
            self.rebalance_leaf(&mut state, leaf, path)?;
        }

        Ok(Some(value))
    }

    /// Remove every entry and reset the tree, including after corruption.
    pub fn clear(&self) -> Result<(), TreeError> {
        let mut state = self.write_state()?;
        if !self.store.clear() {
            return Err(TreeError::Poisoned);
        }
        let root = self.store.allocate(true).map_err(TreeError::Store)?;
        self.store
            .put(Node::Leaf(LeafNode::new(root)))
            .map_err(TreeError::Store)?;
        *state = TreeState::new(root);
        self.valid.store(true, Ordering::SeqCst);

        tracing::info!("B+Tree cleared");
        Ok(())
    }

    /// Iterate over entries whose keys fall in `range`, in ascending order.
    ///
    /// # Deadlocks
    ///
    /// The iterator holds the tree's shared lock until dropped. Calling
    /// `insert`, `remove` or `clear` on the same thread while it is alive
    /// blocks forever.
    pub fn range<R: RangeBounds<K>>(&self, range: R) -> Result<RangeIter<'_, K, V, S>, TreeError> {
        let state = self.read_state()?;

        let (leaf, index) = match range.start_bound() {
            Bound::Included(start) => {
                let (leaf, _) = self.find_leaf(&state, start)?;
                let index = leaf.find_index(start).unwrap_or_else(|i| i);
                (leaf, index)
            }
            Bound::Excluded(start) => {
                let (leaf, _) = self.find_leaf(&state, start)?;
                let index = leaf.find_index(start).map_or_else(|i| i, |i| i + 1);
                (leaf, index)
            }
            Bound::Unbounded => (self.edge_leaf(&state, state.root, false)?, 0),
        };

        Ok(RangeIter {
            tree: self,
            _guard: state,
            leaf: Some(leaf),
            index,
            end: range.end_bound().cloned(),
        })
    }

    /// Iterate over all entries in ascending key order.
    ///
    /// # Deadlocks
    ///
    /// Same as [`range`](Self::range): drop the iterator before mutating.
    pub fn iter(&self) -> Result<RangeIter<'_, K, V, S>, TreeError> {
        self.range(..)
    }

    /// Smallest key.
    pub fn first_key(&self) -> Result<Option<K>, TreeError> {
        let state = self.read_state()?;
        let leaf = self.edge_leaf(&state, state.root, false)?;
        Ok(leaf.keys.first().cloned())
    }

    /// Largest key.
    pub fn last_key(&self) -> Result<Option<K>, TreeError> {
        let state = self.read_state()?;
        let leaf = self.edge_leaf(&state, state.root, true)?;
        Ok(leaf.keys.last().cloned())
    }

    /// Smallest key greater than or equal to `key`.
    pub fn ceiling_key(&self, key: &K) -> Result<Option<K>, TreeError> {
        self.first_in(self.range((Bound::Included(key.clone()), Bound::Unbounded))?)
    }

    /// Smallest key strictly greater than `key`.
    pub fn higher_key(&self, key: &K) -> Result<Option<K>, TreeError> {
        self.first_in(self.range((Bound::Excluded(key.clone()), Bound::Unbounded))?)
    }

    /// Largest key less than or equal to `key`.
    pub fn floor_key(&self, key: &K) -> Result<Option<K>, TreeError> {
        self.preceding_key(key, true)
    }

    /// Largest key strictly less than `key`.
    pub fn lower_key(&self, key: &K) -> Result<Option<K>, TreeError> {
        self.preceding_key(key, false)
    }

    fn first_in(&self, mut iter: RangeIter<'_, K, V, S>) -> Result<Option<K>, TreeError> {
        Ok(iter.next_entry()?.map(|(k, _)| k))
    }

    fn preceding_key(&self, key: &K, inclusive: bool) -> Result<Option<K>, TreeError> {
        let state = self.read_state()?;
        let (leaf, path) = self.find_leaf(&state, key)?;

        let end = match leaf.find_index(key) {
            Ok(i) if inclusive => i + 1,
            Ok(i) | Err(i) => i,
        };
        if end > 0 {
            return Ok(Some(leaf.keys[end - 1].clone()));
        }

        // Predecessor lives in the subtree left of the deepest right turn
        for &(id, child_index) in path.iter().rev() {
            if child_index > 0 {
                let node = self.load_internal(id)?;
                let left = self.edge_leaf(&state, node.children[child_index - 1], true)?;
                return Ok(left.keys.last().cloned());
            }
        }
        Ok(None)
    }

    /// Descend from the root to the leaf covering `key`.
    fn find_leaf(&self, state: &TreeState, key: &K) -> Result<(LeafNode<K, V>, Path), TreeError> {
        let mut path = Path::with_capacity(state.height);
        let mut current = state.root;

        loop {
            match self.load(current)? {
                Node::Leaf(leaf) => {
                    if path.len() + 1 != state.height {
                        return Err(self.corruption(format!(
                            "leaf {current} found at depth {}, expected {}",
                            path.len(),
                            state.height - 1
                        )));
                    }
                    return Ok((leaf, path));
                }
                Node::Internal(node) => {
                    if path.len() + 1 >= state.height {
                        return Err(self.corruption(format!(
                            "internal node {current} found below the leaf level"
                        )));
                    }
                    let child_index = node.find_child_index(key);
                    current = *node.children.get(child_index).ok_or_else(|| {
                        self.corruption(format!("internal node {current} is missing child {child_index}"))
                    })?;
                    path.push((node.id, child_index));
                }
            }
        }
    }

    /// Follow first (or last) children from `start` down to a leaf.
    fn edge_leaf(
        &self,
        state: &TreeState,
        start: NodeId,
        rightmost: bool,
    ) -> Result<LeafNode<K, V>, TreeError> {
        let mut current = start;
        for _ in 0..state.height {
            match self.load(current)? {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Internal(node) => {
                    let child = if rightmost {
                        node.children.last()
                    } else {
                        node.children.first()
                    };
                    current = *child.ok_or_else(|| {
                        self.corruption(format!("internal node {} has no children", node.id))
                    })?;
                }
            }
        }
        Err(self.corruption(format!("no leaf within {} levels", state.height)))
    }

    /// Insert a separator into the parent after a child split, splitting
    /// upward as long as parents overflow.
    fn insert_into_parent(
        &self,
        state: &mut TreeState,
        path: &mut Path,
        left_child: NodeId,
        key: K,
        right_child: NodeId,
    ) -> Result<(), TreeError> {
        let mut left_child = left_child;
        let mut key = key;
        let mut right_child = right_child;

        while let Some((parent_id, child_index)) = path.pop() {
            let mut parent = self.load_internal(parent_id)?;
            parent.insert_after(child_index, key, right_child);

            if parent.children.len() <= self.order.internal {
                return self.put(Node::Internal(parent));
            }

            let right_id = self.allocate(false)?;
            let (median_key, right_parent) = parent.split(right_id);
            tracing::debug!("Split internal node {parent_id}, new right sibling {right_id}");

            self.put(Node::Internal(parent))?;
            self.put(Node::Internal(right_parent))?;

            left_child = parent_id;
            key = median_key;
            right_child = right_id;
        }

        // No parent - need to create a new root
        let root_id = self.allocate(false)?;
        self.put(Node::Internal(InternalNode::with_children(
            root_id,
            left_child,
            key,
            right_child,
        )))?;
        state.root = root_id;
        state.height += 1;
        tracing::debug!("New root {root_id}, height {}", state.height);

        Ok(())
    }

    /// Point the ancestor separator equal to `old` at the leaf's new first key.
    fn replace_separator(&self, path: &[(NodeId, usize)], old: &K, new: K) -> Result<(), TreeError> {
        let Some(&(id, child_index)) = path.iter().rev().find(|(_, i)| *i > 0) else {
            return Ok(());
        };
        let mut node = self.load_internal(id)?;
        if let Some(separator) = node.keys.get_mut(child_index - 1) {
            if separator == old {
                *separator = new;
                return self.put(Node::Internal(node));
            }
        }
        Ok(())
    }

    /// Fix an underfull non-root leaf by borrowing from or merging with a sibling.
    fn rebalance_leaf(
        &self,
        state: &mut TreeState,
        mut leaf: LeafNode<K, V>,
        mut path: Path,
    ) -> Result<(), TreeError> {
        let Some((parent_id, index)) = path.pop() else {
            return self.put(Node::Leaf(leaf));
        };
        let mut parent = self.load_internal(parent_id)?;
        let min = self.order.min_leaf();

        let left = match index.checked_sub(1) {
            Some(i) => Some(self.load_leaf(parent.children[i])?),
            None => None,
        };
        let right = match parent.children.get(index + 1) {
            Some(&id) => Some(self.load_leaf(id)?),
            None => None,
        };

        match (left, right) {
            (Some(mut left), _) if left.len() > min => {
                let (key, value) = left.remove_at(left.len() - 1);
                leaf.keys.insert(0, key.clone());
                leaf.values.insert(0, value);
                parent.keys[index - 1] = key;
                tracing::debug!("Moved entry from leaf {} to leaf {}", left.id, leaf.id);

                self.put(Node::Leaf(left))?;
                self.put(Node::Leaf(leaf))?;
                self.put(Node::Internal(parent))
            }
            (_, Some(mut right)) if right.len() > min => {
                let (key, value) = right.remove_at(0);
                leaf.keys.push(key);
                leaf.values.push(value);
                parent.keys[index] = right.keys[0].clone();
                tracing::debug!("Moved entry from leaf {} to leaf {}", right.id, leaf.id);

                self.put(Node::Leaf(right))?;
                self.put(Node::Leaf(leaf))?;
                self.put(Node::Internal(parent))
            }
            (Some(mut left), _) => {
                tracing::debug!("Merging leaf {} into leaf {}", leaf.id, left.id);
                left.absorb(&mut leaf);
                parent.keys.remove(index - 1);
                parent.children.remove(index);

                self.put(Node::Leaf(left))?;
                self.free(Node::Leaf(leaf))?;
                self.rebalance_internal(state, parent, path)
            }
            (None, Some(mut right)) => {
                tracing::debug!("Merging leaf {} into leaf {}", right.id, leaf.id);
                leaf.absorb(&mut right);
                parent.keys.remove(index);
                parent.children.remove(index + 1);

                self.put(Node::Leaf(leaf))?;
                self.free(Node::Leaf(right))?;
                self.rebalance_internal(state, parent, path)
            }
            (None, None) => Err(self.corruption(format!(
                "internal node {parent_id} has a single child"
            ))),
        }
    }

    /// Fix an internal node after it lost a child, walking up toward the root.
    fn rebalance_internal(
        &self,
        state: &mut TreeState,
        mut node: InternalNode<K>,
        mut path: Path,
    ) -> Result<(), TreeError> {
        let min = self.order.min_internal();

        loop {
            let Some((parent_id, index)) = path.pop() else {
                // Root with a single child: the child becomes the root
                if node.keys.is_empty() {
                    let child = node.children.first().copied().ok_or_else(|| {
                        self.corruption(format!("root {} has no children", node.id))
                    })?;
                    state.root = child;
                    state.height -= 1;
                    tracing::debug!("Collapsed root {} into {child}, height {}", node.id, state.height);
                    return self.free(Node::Internal(node));
                }
                return self.put(Node::Internal(node));
            };

            if node.children.len() >= min {
                return self.put(Node::Internal(node));
            }

            let mut parent = self.load_internal(parent_id)?;
            let left = match index.checked_sub(1) {
                Some(i) => Some(self.load_internal(parent.children[i])?),
                None => None,
            };
            let right = match parent.children.get(index + 1) {
                Some(&id) => Some(self.load_internal(id)?),
                None => None,
            };

            match (left, right) {
                (Some(mut left), _) if left.children.len() > min => {
                    let (Some(child), Some(key)) = (left.children.pop(), left.keys.pop()) else {
                        return Err(self.corruption(format!("internal node {} is empty", left.id)));
                    };
                    node.children.insert(0, child);
                    node.keys
                        .insert(0, std::mem::replace(&mut parent.keys[index - 1], key));
                    tracing::debug!("Moved child from node {} to node {}", left.id, node.id);

                    self.put(Node::Internal(left))?;
                    self.put(Node::Internal(node))?;
                    return self.put(Node::Internal(parent));
                }
                (_, Some(mut right)) if right.children.len() > min => {
                    let child = right.children.remove(0);
                    let key = right.keys.remove(0);
                    node.children.push(child);
                    node.keys
                        .push(std::mem::replace(&mut parent.keys[index], key));
                    tracing::debug!("Moved child from node {} to node {}", right.id, node.id);

                    self.put(Node::Internal(right))?;
                    self.put(Node::Internal(node))?;
                    return self.put(Node::Internal(parent));
                }
                (Some(mut left), _) => {
                    tracing::debug!("Merging node {} into node {}", node.id, left.id);
                    left.keys.push(parent.keys.remove(index - 1));
                    left.keys.append(&mut node.keys);
                    left.children.append(&mut node.children);
                    parent.children.remove(index);

                    self.put(Node::Internal(left))?;
                    self.free(Node::Internal(node))?;
                }
                (None, Some(mut right)) => {
                    tracing::debug!("Merging node {} into node {}", right.id, node.id);
                    node.keys.push(parent.keys.remove(index));
                    node.keys.append(&mut right.keys);
                    node.children.append(&mut right.children);
                    parent.children.remove(index + 1);

                    self.put(Node::Internal(node))?;
                    self.free(Node::Internal(right))?;
                }
                (None, None) => {
                    return Err(self.corruption(format!(
                        "internal node {parent_id} has a single child"
                    )));
                }
            }

            node = parent;
        }
    }

    pub(super) fn read_state(&self) -> Result<RwLockReadGuard<'_, TreeState>, TreeError> {
        self.state.read().map_err(|_| TreeError::Poisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, TreeState>, TreeError> {
        self.state.write().map_err(|_| TreeError::Poisoned)
    }

    fn ensure_valid(&self) -> Result<(), TreeError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(TreeError::CorruptionDetected(
                "tree is marked invalid; clear it before further changes".to_string(),
            ))
        }
    }

    /// Mark the tree invalid and build the error to report.
    pub(super) fn corruption(&self, message: String) -> TreeError {
        self.valid.store(false, Ordering::SeqCst);
        tracing::error!("B+Tree corruption detected: {message}");
        TreeError::CorruptionDetected(message)
    }

    /// Store failures inside tree operations mean the structure is damaged.
    fn escalate(&self, error: StoreError) -> TreeError {
        if error == StoreError::Poisoned {
            return TreeError::Poisoned;
        }
        self.corruption(format!("store failure: {error}"))
    }

    fn allocate(&self, is_leaf: bool) -> Result<NodeId, TreeError> {
        self.store.allocate(is_leaf).map_err(|e| self.escalate(e))
    }

    pub(super) fn load(&self, id: NodeId) -> Result<Node<K, V>, TreeError> {
        self.store.get(id).map_err(|e| self.escalate(e))
    }

    fn load_leaf(&self, id: NodeId) -> Result<LeafNode<K, V>, TreeError> {
        match self.load(id)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(self.corruption(format!("expected leaf at {id}"))),
        }
    }

    fn load_internal(&self, id: NodeId) -> Result<InternalNode<K>, TreeError> {
        match self.load(id)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(self.corruption(format!("expected internal node at {id}"))),
        }
    }

    fn put(&self, node: Node<K, V>) -> Result<(), TreeError> {
        self.store.put(node).map_err(|e| self.escalate(e))
    }

    fn free(&self, mut node: Node<K, V>) -> Result<(), TreeError> {
        self.store.free(&mut node).map_err(|e| self.escalate(e))
    }
}

/// Ordered iterator over a key range.
///
/// Holds the tree's shared lock; writers wait until it is dropped.
pub struct RangeIter<'a, K, V, S> {
    tree: &'a BPlusTree<K, V, S>,
    _guard: RwLockReadGuard<'a, TreeState>,
    leaf: Option<LeafNode<K, V>>,
    index: usize,
    end: Bound<K>,
}

impl<K: Holder, V: Holder, S: NodeStore<K, V>> RangeIter<'_, K, V, S> {
    /// Get the next entry.
    pub fn next_entry(&mut self) -> Result<Option<(K, V)>, TreeError> {
        loop {
            let Some(leaf) = &self.leaf else {
                return Ok(None);
            };

            if self.index < leaf.len() {
                let key = &leaf.keys[self.index];
                let in_range = match &self.end {
                    Bound::Included(end) => key <= end,
                    Bound::Excluded(end) => key < end,
                    Bound::Unbounded => true,
                };
                if !in_range {
                    self.leaf = None;
                    return Ok(None);
                }
                let entry = (key.clone(), leaf.values[self.index].clone());
                self.index += 1;
                return Ok(Some(entry));
            }

            // Move to next leaf
            let next = leaf.next;
            self.index = 0;
            self.leaf = None;
            if !next.is_null() {
                self.leaf = Some(self.tree.load_leaf(next)?);
            }
        }
    }
}

impl<K: Holder, V: Holder, S: NodeStore<K, V>> Iterator for RangeIter<'_, K, V, S> {
    type Item = Result<(K, V), TreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Errors that can occur during B+Tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The order or block size cannot produce a usable tree.
    InvalidConfiguration(String),
    /// The blank factory for the named role produced nothing.
    TypeInstantiation(&'static str),
    /// A structural invariant does not hold.
    CorruptionDetected(String),
    /// The node store failed while building or resetting the tree.
    Store(StoreError),
    /// A lock was poisoned by a panicking thread.
    Poisoned,
}

impl TreeError {
    /// Whether this error marks the tree invalid.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptionDetected(_))
    }
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfiguration(message) => write!(f, "invalid configuration: {message}"),
            Self::TypeInstantiation(role) => {
                write!(f, "could not create a blank {role} instance")
            }
            Self::CorruptionDetected(message) => write!(f, "corruption detected: {message}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Poisoned => write!(f, "tree lock poisoned"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
