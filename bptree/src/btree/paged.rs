//! Node store that keeps every node as an encoded page.
//!
//! Nodes are serialized on `put` and decoded on `get`, so the tree runs
//! against the exact byte format a durable backend would write. Pages live
//! in memory.
//!
//! # Page format
//!
//! ```text
//! +----------------+---------------------------+
//! | crc32: u32 LE  | node body (Node::write_to) |
//! +----------------+---------------------------+
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use crate::btree::node::{Node, NodeId};
use crate::btree::store::{IdAllocator, NodeStore, StoreError};
use crate::holder::{CodecError, Holder, take_array};

/// Size of the page header (checksum).
pub const PAGE_HEADER_SIZE: usize = 4;

/// Encode a node into a checksummed page.
#[must_use]
pub fn encode_page<K: Holder, V: Holder>(node: &Node<K, V>) -> Vec<u8> {
    let mut page = vec![0u8; PAGE_HEADER_SIZE];
    node.write_to(&mut page);
    let checksum = crc32fast::hash(&page[PAGE_HEADER_SIZE..]);
    page[..PAGE_HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());
    page
}

/// Verify a page checksum and decode the node stored under `id`.
pub fn decode_page<K: Holder, V: Holder>(
    id: NodeId,
    mut page: &[u8],
    key_blank: &K,
    value_blank: &V,
) -> Result<Node<K, V>, CodecError> {
    let expected = u32::from_le_bytes(take_array(&mut page)?);
    let actual = crc32fast::hash(page);
    if expected != actual {
        return Err(CodecError::ChecksumMismatch { expected, actual });
    }
    Node::read_from(id, page, key_blank, value_blank)
}

/// Memory-resident store of encoded node pages.
pub struct PagedNodeStore<K, V> {
    pages: RwLock<HashMap<i32, Vec<u8>>>,
    ids: IdAllocator,
    key_blank: K,
    value_blank: V,
}

impl<K: Holder, V: Holder> PagedNodeStore<K, V> {
    /// Create a store that decodes with the given blank instances.
    #[must_use]
    pub fn new(key_blank: K, value_blank: V) -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            ids: IdAllocator::default(),
            key_blank,
            value_blank,
        }
    }

    /// Total bytes held in pages.
    #[must_use]
    pub fn stored_bytes(&self) -> usize {
        self.pages
            .read()
            .map_or(0, |pages| pages.values().map(Vec::len).sum())
    }

    /// Raw page stored under `id`, if any.
    #[must_use]
    pub fn page(&self, id: NodeId) -> Option<Vec<u8>> {
        self.pages
            .read()
            .ok()
            .and_then(|pages| pages.get(&id.raw()).cloned())
    }

    /// Replace the raw page stored under `id`.
    pub fn write_page(&self, id: NodeId, page: Vec<u8>) -> Result<(), StoreError> {
        let mut pages = self.pages.write().map_err(|_| StoreError::Poisoned)?;
        pages.insert(id.raw(), page);
        Ok(())
    }
}

impl<K: Holder, V: Holder> NodeStore<K, V> for PagedNodeStore<K, V> {
    fn allocate(&self, is_leaf: bool) -> Result<NodeId, StoreError> {
        self.ids.next(is_leaf)
    }

    fn get(&self, id: NodeId) -> Result<Node<K, V>, StoreError> {
        let pages = self.pages.read().map_err(|_| StoreError::Poisoned)?;
        let page = pages.get(&id.raw()).ok_or(StoreError::NotFound(id))?;
        Ok(decode_page(id, page, &self.key_blank, &self.value_blank)?)
    }

    fn put(&self, node: Node<K, V>) -> Result<(), StoreError> {
        self.write_page(node.id(), encode_page(&node))
    }

    fn free(&self, node: &mut Node<K, V>) -> Result<(), StoreError> {
        let id = node.id();
        if id.is_null() {
            tracing::error!("attempted to free the null node id");
            return Err(StoreError::NullId);
        }
        let mut pages = self.pages.write().map_err(|_| StoreError::Poisoned)?;
        node.clear();
        pages.remove(&id.raw());
        Ok(())
    }

    fn clear(&self) -> bool {
        let Ok(mut pages) = self.pages.write() else {
            return false;
        };
        pages.clear();
        self.ids.reset();
        true
    }

    fn highest_id(&self) -> i32 {
        self.ids.highest()
    }

    fn len(&self) -> usize {
        self.pages.read().map_or_else(
            |_| {
                tracing::error!("page store lock poisoned, reporting zero pages");
                0
            },
            |pages| pages.len(),
        )
    }

    fn release_resources(&self) {
        if let Ok(mut pages) = self.pages.write() {
            pages.shrink_to_fit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::{InternalNode, LeafNode};
    use crate::holder::{IntHolder, StringHolder};

    fn store() -> PagedNodeStore<IntHolder, StringHolder> {
        PagedNodeStore::new(IntHolder::default(), StringHolder::default())
    }

    #[test]
    fn test_put_get_through_pages() {
        let store = store();
        let mut leaf = LeafNode::new(store.allocate(true).expect("allocate"));
        leaf.insert(IntHolder(1), StringHolder::from("one"));
        leaf.insert(IntHolder(2), StringHolder::from("two"));
        let node = Node::Leaf(leaf);

        store.put(node.clone()).expect("put");
        assert_eq!(store.get(node.id()).expect("get"), node);

        let page = store.page(node.id()).expect("page");
        let mut body = Vec::new();
        node.write_to(&mut body);
        assert_eq!(page.len(), PAGE_HEADER_SIZE + body.len());
        assert_eq!(store.stored_bytes(), page.len());
    }

    #[test]
    fn test_internal_node_through_pages() {
        let store = store();
        let id = store.allocate(false).expect("allocate");
        let node = Node::Internal(InternalNode::with_children(
            id,
            NodeId::from_raw(1),
            IntHolder(7),
            NodeId::from_raw(2),
        ));
        store.put(node.clone()).expect("put");
        assert_eq!(store.get(id).expect("get"), node);
    }

    #[test]
    fn test_corrupted_page_is_detected() {
        let store = store();
        let mut leaf = LeafNode::new(store.allocate(true).expect("allocate"));
        leaf.insert(IntHolder(1), StringHolder::from("one"));
        let node = Node::Leaf(leaf);
        store.put(node.clone()).expect("put");

        let mut page = store.page(node.id()).expect("page");
        let last = page.len() - 1;
        page[last] ^= 0xff;
        store.write_page(node.id(), page).expect("write");

        let err = store.get(node.id()).expect_err("corrupt");
        assert!(matches!(
            err,
            StoreError::Codec(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_free_null_id_is_reported() {
        let store = store();
        let mut null = Node::Leaf(LeafNode::new(NodeId::NULL));
        assert_eq!(store.free(&mut null), Err(StoreError::NullId));
    }

    #[test]
    fn test_clear_and_release() {
        let store = store();
        let node = Node::Leaf(LeafNode::new(store.allocate(true).expect("allocate")));
        store.put(node.clone()).expect("put");
        store.release_resources();
        assert_eq!(store.len(), 1);
        assert!(store.clear());
        assert!(store.is_empty());
        assert_eq!(store.highest_id(), 0);
    }

    #[test]
    fn test_poisoned_free_keeps_page() {
        let store = store();
        let mut leaf = LeafNode::new(store.allocate(true).expect("allocate"));
        leaf.insert(IntHolder(1), StringHolder::from("one"));
        let mut node = Node::Leaf(leaf);
        store.put(node.clone()).expect("put");

        std::thread::scope(|s| {
            let result = s
                .spawn(|| {
                    let _guard = store.pages.write().expect("lock");
                    panic!("poison the page map");
                })
                .join();
            assert!(result.is_err());
        });

        assert_eq!(store.free(&mut node), Err(StoreError::Poisoned));
        assert_eq!(node.key_count(), 1);
        assert_eq!(store.len(), 0);
    }
}
