//! Node storage backends.
//!
//! The tree never holds nodes across operations: it allocates ids, fetches
//! nodes by id, mutates its own copy, and writes them back. A backend is free
//! to keep nodes resident ([`MemoryNodeStore`]) or to serialize them
//! ([`PagedNodeStore`](super::PagedNodeStore)).
//!
//! # Invariants
//!
//! - Ids issued by `allocate(true)` are positive, by `allocate(false)` negative
//! - An id is never issued twice until the store is cleared
//! - Allocation past `i32::MAX` fails with `StoreError::IdsExhausted` instead of wrapping
//! - `free` on the null id removes nothing and reports `StoreError::NullId`

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::btree::node::{Node, NodeId};
use crate::holder::{CodecError, Holder};

/// Storage capability consumed by [`BPlusTree`](super::BPlusTree).
pub trait NodeStore<K, V>: Send + Sync {
    /// Issue a fresh id. Does not create the node.
    fn allocate(&self, is_leaf: bool) -> Result<NodeId, StoreError>;

    /// Fetch the node stored under `id`.
    fn get(&self, id: NodeId) -> Result<Node<K, V>, StoreError>;

    /// Store `node` under its own id, replacing any previous content.
    fn put(&self, node: Node<K, V>) -> Result<(), StoreError>;

    /// Clear `node` and remove it from the store.
    fn free(&self, node: &mut Node<K, V>) -> Result<(), StoreError>;

    /// Remove every node and reset allocation.
    fn clear(&self) -> bool;

    /// Current value of the allocation counter.
    fn highest_id(&self) -> i32;

    /// Number of nodes currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backend-specific teardown.
    fn release_resources(&self) {}
}

/// Monotonic id source shared by the store implementations.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: AtomicI32,
}

impl IdAllocator {
    /// Issue the next id, failing instead of wrapping at `i32::MAX`.
    pub fn next(&self, is_leaf: bool) -> Result<NodeId, StoreError> {
        let previous = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |seq| seq.checked_add(1))
            .map_err(|_| {
                tracing::error!("node id space exhausted");
                StoreError::IdsExhausted
            })?;
        Ok(NodeId::new(previous + 1, is_leaf))
    }

    pub fn highest(&self) -> i32 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }
}

/// Memory-backed node store.
///
/// Nodes stay resident in a map keyed by raw id.
#[derive(Debug)]
pub struct MemoryNodeStore<K, V> {
    nodes: RwLock<HashMap<i32, Node<K, V>>>,
    ids: IdAllocator,
}

impl<K, V> MemoryNodeStore<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::with_capacity(17)),
            ids: IdAllocator::default(),
        }
    }
}

impl<K, V> Default for MemoryNodeStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Holder, V: Holder> NodeStore<K, V> for MemoryNodeStore<K, V> {
    fn allocate(&self, is_leaf: bool) -> Result<NodeId, StoreError> {
        self.ids.next(is_leaf)
    }

    fn get(&self, id: NodeId) -> Result<Node<K, V>, StoreError> {
        let nodes = self.nodes.read().map_err(|_| StoreError::Poisoned)?;
        nodes.get(&id.raw()).cloned().ok_or(StoreError::NotFound(id))
    }

    fn put(&self, node: Node<K, V>) -> Result<(), StoreError> {
        let mut nodes = self.nodes.write().map_err(|_| StoreError::Poisoned)?;
        nodes.insert(node.id().raw(), node);
        Ok(())
    }

    fn free(&self, node: &mut Node<K, V>) -> Result<(), StoreError> {
        let id = node.id();
        if id.is_null() {
            tracing::error!("attempted to free the null node id");
            return Err(StoreError::NullId);
        }
        let mut nodes = self.nodes.write().map_err(|_| StoreError::Poisoned)?;
        node.clear();
        nodes.remove(&id.raw());
        Ok(())
    }

    fn clear(&self) -> bool {
        let Ok(mut nodes) = self.nodes.write() else {
            return false;
        };
        nodes.clear();
        self.ids.reset();
        true
    }

    fn highest_id(&self) -> i32 {
        self.ids.highest()
    }

    fn len(&self) -> usize {
        self.nodes.read().map_or_else(
            |_| {
                tracing::error!("node store lock poisoned, reporting zero nodes");
                0
            },
            |nodes| nodes.len(),
        )
    }
}

/// Errors reported by a node store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No node is stored under the id.
    NotFound(NodeId),
    /// The null id was passed where a real node was required.
    NullId,
    /// A stored node could not be decoded.
    Codec(CodecError),
    /// A store lock was poisoned by a panicking thread.
    Poisoned,
    /// Every positive id has been issued.
    IdsExhausted,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "node {id} not found"),
            Self::NullId => write!(f, "operation on the null node id"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Poisoned => write!(f, "store lock poisoned"),
            Self::IdsExhausted => write!(f, "node ids exhausted"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}
