//! B+Tree node types and serialization.
//!
//! Nodes are addressed by a signed [`NodeId`]:
//! - positive ids are leaves
//! - negative ids are internal nodes
//! - zero is the null id
//!
//! Leaves store key-value pairs and link to the next leaf for range scans.
//! Internal nodes store separator keys and child ids.

#![allow(clippy::cast_possible_truncation)]

use std::fmt;

use crate::holder::{CodecError, Holder, take_array};

/// Identifier of a node in a [`NodeStore`](super::NodeStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeId(i32);

impl NodeId {
    /// The reserved "absent" id.
    pub const NULL: Self = Self(0);

    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Build the id for sequence number `seq` of the given kind.
    #[must_use]
    pub const fn new(seq: i32, is_leaf: bool) -> Self {
        if is_leaf { Self(seq) } else { Self(-seq) }
    }

    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_leaf(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_internal(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node type discriminant in the encoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Internal),
            1 => Ok(Self::Leaf),
            _ => Err(value),
        }
    }
}

/// A leaf node.
///
/// `keys` and `values` are parallel and sorted by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode<K, V> {
    pub id: NodeId,
    pub keys: Vec<K>,
    pub values: Vec<V>,
    /// Next leaf in key order, or `NodeId::NULL`.
    pub next: NodeId,
}

impl<K: Holder, V: Holder> LeafNode<K, V> {
    /// Create a new empty leaf.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::new() is not const-stable
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            keys: Vec::new(),
            values: Vec::new(),
            next: NodeId::NULL,
        }
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::is_empty() is not const-stable
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Find the index where a key should be inserted (or exists).
    pub fn find_index(&self, key: &K) -> Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Get a value by key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find_index(key).ok().map(|i| &self.values[i])
    }

    /// Insert or update an entry.
    ///
    /// Returns the old value if updating, None if inserting.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.find_index(&key) {
            Ok(i) => Some(std::mem::replace(&mut self.values[i], value)),
            Err(i) => {
                self.keys.insert(i, key);
                self.values.insert(i, value);
                None
            }
        }
    }

    /// Remove the entry at `index`.
    pub fn remove_at(&mut self, index: usize) -> (K, V) {
        (self.keys.remove(index), self.values.remove(index))
    }

    /// Split the node, moving the upper half into a new leaf with id `right_id`.
    ///
    /// Returns the separator (first key of the right node) and the right node.
    /// The caller is responsible for linking `self.next` to the new leaf.
    #[must_use]
    pub fn split(&mut self, right_id: NodeId) -> (K, Self) {
        let mid = self.keys.len() / 2;

        let keys: Vec<K> = self.keys.drain(mid..).collect();
        let values: Vec<V> = self.values.drain(mid..).collect();
        let split_key = keys[0].clone();

        let right = Self {
            id: right_id,
            keys,
            values,
            next: self.next,
        };

        (split_key, right)
    }

    /// Append all entries of `right` to this leaf and take over its link.
    pub fn absorb(&mut self, right: &mut Self) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }

    fn write_body(&self, buf: &mut Vec<u8>) {
        for key in &self.keys {
            key.serialize(buf);
        }
        for value in &self.values {
            value.serialize(buf);
        }
        buf.extend_from_slice(&self.next.raw().to_le_bytes());
    }

    fn read_body(
        id: NodeId,
        count: usize,
        buf: &mut &[u8],
        key_blank: &K,
        value_blank: &V,
    ) -> Result<Self, CodecError> {
        let keys = (0..count)
            .map(|_| key_blank.deserialize(buf))
            .collect::<Result<Vec<_>, _>>()?;
        let values = (0..count)
            .map(|_| value_blank.deserialize(buf))
            .collect::<Result<Vec<_>, _>>()?;
        let next = NodeId::from_raw(i32::from_le_bytes(take_array(buf)?));
        Ok(Self {
            id,
            keys,
            values,
            next,
        })
    }
}

/// An internal (non-leaf) node.
///
/// Stores N keys and N+1 child ids.
/// `children[i]` covers keys < `keys[i]`,
/// `children[i+1]` covers keys >= `keys[i]`, and
/// `keys[i]` is the smallest key reachable through `children[i+1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pub id: NodeId,
    pub keys: Vec<K>,
    pub children: Vec<NodeId>,
}

impl<K: Holder> InternalNode<K> {
    /// Create an internal node with two children separated by `key`.
    #[must_use]
    pub fn with_children(id: NodeId, left_child: NodeId, key: K, right_child: NodeId) -> Self {
        Self {
            id,
            keys: vec![key],
            children: vec![left_child, right_child],
        }
    }

    /// Find the child index for a given key.
    #[must_use]
    pub fn find_child_index(&self, key: &K) -> usize {
        match self.keys.binary_search(key) {
            Ok(i) => i + 1, // Exact match, go right
            Err(i) => i,
        }
    }

    /// Insert `key` and its right child after the child at `child_index`.
    pub fn insert_after(&mut self, child_index: usize, key: K, right_child: NodeId) {
        self.keys.insert(child_index, key);
        self.children.insert(child_index + 1, right_child);
    }

    /// Split the node, returning the median key and the new right node.
    ///
    /// The median moves up; it is not kept in either half.
    #[must_use]
    pub fn split(&mut self, right_id: NodeId) -> (K, Self) {
        let mid = self.keys.len() / 2;

        let right_keys: Vec<K> = self.keys.drain(mid + 1..).collect();
        let right_children: Vec<NodeId> = self.children.drain(mid + 1..).collect();

        // Only the median remains past the left half
        let median_key = self.keys.remove(mid);

        let right = Self {
            id: right_id,
            keys: right_keys,
            children: right_children,
        };

        (median_key, right)
    }

    fn write_body(&self, buf: &mut Vec<u8>) {
        for key in &self.keys {
            key.serialize(buf);
        }
        for child in &self.children {
            buf.extend_from_slice(&child.raw().to_le_bytes());
        }
    }

    fn read_body(
        id: NodeId,
        count: usize,
        buf: &mut &[u8],
        key_blank: &K,
    ) -> Result<Self, CodecError> {
        let keys = (0..count)
            .map(|_| key_blank.deserialize(buf))
            .collect::<Result<Vec<_>, _>>()?;
        let children = (0..=count)
            .map(|_| take_array(buf).map(|b| NodeId::from_raw(i32::from_le_bytes(b))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { id, keys, children })
    }
}

/// A tree node of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K>),
}

impl<K: Holder, V: Holder> Node<K, V> {
    #[must_use]
    pub const fn id(&self) -> NodeId {
        match self {
            Self::Leaf(leaf) => leaf.id,
            Self::Internal(node) => node.id,
        }
    }

    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Leaf(_) => NodeType::Leaf,
            Self::Internal(_) => NodeType::Internal,
        }
    }

    /// Number of keys held.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec::len() is not const-stable
    pub fn key_count(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.keys.len(),
            Self::Internal(node) => node.keys.len(),
        }
    }

    /// Drop all content, leaving an empty node with the same id.
    pub fn clear(&mut self) {
        match self {
            Self::Leaf(leaf) => {
                leaf.keys.clear();
                leaf.values.clear();
                leaf.next = NodeId::NULL;
            }
            Self::Internal(node) => {
                node.keys.clear();
                node.children.clear();
            }
        }
    }

    /// Serialize the node body.
    ///
    /// Layout (little-endian):
    /// - `node_type`: 1 byte
    /// - `key_count`: 4 bytes
    /// - keys
    /// - leaf: values, then `next`: 4 bytes
    /// - internal: `key_count + 1` child ids, 4 bytes each
    ///
    /// The id itself is not written; it is the address the body is stored under.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.push(self.node_type() as u8);
        buf.extend_from_slice(&(self.key_count() as u32).to_le_bytes());
        match self {
            Self::Leaf(leaf) => leaf.write_body(buf),
            Self::Internal(node) => node.write_body(buf),
        }
    }

    /// Decode a node body stored under `id`.
    ///
    /// The encoded kind must agree with the sign of `id`, and the body must be
    /// consumed exactly.
    pub fn read_from(
        id: NodeId,
        mut buf: &[u8],
        key_blank: &K,
        value_blank: &V,
    ) -> Result<Self, CodecError> {
        let [kind] = take_array::<1>(&mut buf)?;
        let node_type = NodeType::try_from(kind).map_err(CodecError::InvalidNodeType)?;
        let count = u32::from_le_bytes(take_array(&mut buf)?) as usize;

        let node = match node_type {
            NodeType::Leaf if id.is_leaf() => Self::Leaf(LeafNode::read_body(
                id,
                count,
                &mut buf,
                key_blank,
                value_blank,
            )?),
            NodeType::Internal if id.is_internal() => {
                Self::Internal(InternalNode::read_body(id, count, &mut buf, key_blank)?)
            }
            _ => return Err(CodecError::WrongNodeType { id: id.raw() }),
        };

        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes(buf.len()));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::{IntHolder, NullHolder, StringHolder};

    fn leaf_with(id: i32, keys: &[i32]) -> LeafNode<IntHolder, StringHolder> {
        let mut leaf = LeafNode::new(NodeId::from_raw(id));
        for &k in keys {
            leaf.insert(IntHolder(k), StringHolder::new(format!("v{k}")));
        }
        leaf
    }

    #[test]
    fn test_node_id_signing() {
        assert!(NodeId::new(7, true).is_leaf());
        assert!(NodeId::new(7, false).is_internal());
        assert_eq!(NodeId::new(7, false).raw(), -7);
        assert!(NodeId::NULL.is_null());
        assert!(!NodeId::NULL.is_leaf());
        assert!(!NodeId::NULL.is_internal());
    }

    #[test]
    fn test_leaf_node_insert_update() {
        let mut leaf = leaf_with(1, &[]);

        let old = leaf.insert(IntHolder(1), StringHolder::from("a"));
        assert!(old.is_none());
        assert_eq!(leaf.len(), 1);

        let old = leaf.insert(IntHolder(1), StringHolder::from("b"));
        assert_eq!(old, Some(StringHolder::from("a")));
        assert_eq!(leaf.len(), 1);
        assert_eq!(leaf.get(&IntHolder(1)), Some(&StringHolder::from("b")));
    }

    #[test]
    fn test_leaf_node_keeps_keys_sorted() {
        let leaf = leaf_with(1, &[5, 3, 9, 1]);
        assert_eq!(
            leaf.keys,
            vec![IntHolder(1), IntHolder(3), IntHolder(5), IntHolder(9)]
        );
        assert_eq!(leaf.values[0], StringHolder::from("v1"));
    }

    #[test]
    fn test_leaf_node_split() {
        let mut leaf = leaf_with(1, &[1, 2, 3, 4, 5]);
        leaf.next = NodeId::from_raw(9);

        let (split_key, right) = leaf.split(NodeId::from_raw(2));

        assert_eq!(leaf.len(), 2);
        assert_eq!(right.len(), 3);
        assert_eq!(split_key, IntHolder(3));
        assert_eq!(split_key, right.keys[0]);
        // The right half inherits the old link; the caller relinks the left.
        assert_eq!(right.next, NodeId::from_raw(9));
        assert_eq!(right.values.len(), 3);
    }

    #[test]
    fn test_leaf_node_absorb() {
        let mut left = leaf_with(1, &[1, 2]);
        let mut right = leaf_with(2, &[3]);
        right.next = NodeId::from_raw(5);

        left.absorb(&mut right);

        assert_eq!(left.len(), 3);
        assert_eq!(left.next, NodeId::from_raw(5));
        assert!(right.is_empty());
    }

    #[test]
    fn test_internal_node_find_child() {
        let node = InternalNode {
            id: NodeId::from_raw(-1),
            keys: vec![IntHolder(10), IntHolder(20), IntHolder(30)],
            children: vec![1, 2, 3, 4].into_iter().map(NodeId::from_raw).collect(),
        };

        assert_eq!(node.find_child_index(&IntHolder(5)), 0);
        assert_eq!(node.find_child_index(&IntHolder(10)), 1);
        assert_eq!(node.find_child_index(&IntHolder(15)), 1);
        assert_eq!(node.find_child_index(&IntHolder(35)), 3);
    }

    #[test]
    fn test_internal_node_split() {
        // 4 keys, 5 children: an overfull node at order 4
        let mut node = InternalNode {
            id: NodeId::from_raw(-1),
            keys: vec![IntHolder(10), IntHolder(20), IntHolder(30), IntHolder(40)],
            children: (1..=5).map(NodeId::from_raw).collect(),
        };

        let (median, right) = node.split(NodeId::from_raw(-2));

        assert_eq!(median, IntHolder(30));
        assert_eq!(node.keys, vec![IntHolder(10), IntHolder(20)]);
        assert_eq!(node.children.len(), 3);
        assert_eq!(right.keys, vec![IntHolder(40)]);
        assert_eq!(
            right.children,
            vec![NodeId::from_raw(4), NodeId::from_raw(5)]
        );
    }

    #[test]
    fn test_leaf_node_encoding() {
        let mut leaf = leaf_with(3, &[2, 1]);
        leaf.next = NodeId::from_raw(4);
        let node = Node::Leaf(leaf);

        let mut buf = Vec::new();
        node.write_to(&mut buf);

        assert_eq!(buf[0], NodeType::Leaf as u8);
        assert_eq!(&buf[1..5], &2u32.to_le_bytes());
        assert_eq!(&buf[buf.len() - 4..], &4i32.to_le_bytes());

        let restored = Node::read_from(
            NodeId::from_raw(3),
            &buf,
            &IntHolder::default(),
            &StringHolder::default(),
        )
        .expect("should parse");
        assert_eq!(restored, node);
    }

    #[test]
    fn test_internal_node_encoding_size() {
        let node: Node<IntHolder, NullHolder> = Node::Internal(InternalNode::with_children(
            NodeId::from_raw(-1),
            NodeId::from_raw(1),
            IntHolder(50),
            NodeId::from_raw(2),
        ));

        let mut buf = Vec::new();
        node.write_to(&mut buf);

        // kind + count + one key + two child ids
        assert_eq!(buf.len(), 1 + 4 + 4 + 2 * 4);
        let restored = Node::read_from(NodeId::from_raw(-1), &buf, &IntHolder(0), &NullHolder)
            .expect("should parse");
        assert_eq!(restored, node);
    }

    #[test]
    fn test_decode_rejects_kind_mismatch() {
        let node: Node<IntHolder, NullHolder> = Node::Leaf(LeafNode::new(NodeId::from_raw(1)));
        let mut buf = Vec::new();
        node.write_to(&mut buf);

        let err = Node::read_from(NodeId::from_raw(-1), &buf, &IntHolder(0), &NullHolder)
            .expect_err("should reject");
        assert_eq!(err, CodecError::WrongNodeType { id: -1 });
    }

    #[test]
    fn test_decode_rejects_bad_kind_and_trailing_bytes() {
        let err = Node::<IntHolder, NullHolder>::read_from(
            NodeId::from_raw(1),
            &[7, 0, 0, 0, 0],
            &IntHolder(0),
            &NullHolder,
        )
        .expect_err("should reject");
        assert_eq!(err, CodecError::InvalidNodeType(7));

        let node: Node<IntHolder, NullHolder> = Node::Leaf(LeafNode::new(NodeId::from_raw(1)));
        let mut buf = Vec::new();
        node.write_to(&mut buf);
        buf.push(0);
        let err = Node::read_from(NodeId::from_raw(1), &buf, &IntHolder(0), &NullHolder)
            .expect_err("should reject");
        assert_eq!(err, CodecError::TrailingBytes(1));
    }

    #[test]
    fn test_clear_empties_node() {
        let mut node: Node<IntHolder, StringHolder> = Node::Leaf(leaf_with(1, &[1, 2]));
        node.clear();
        assert_eq!(node.key_count(), 0);
        assert_eq!(node.id(), NodeId::from_raw(1));
    }
}
