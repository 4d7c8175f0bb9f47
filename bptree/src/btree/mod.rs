//! B+Tree index over a pluggable node store.
//!
//! # Structure
//!
//! The tree consists of:
//! - Internal nodes: separator keys and child node ids
//! - Leaf nodes: key-value pairs, singly linked for range scans
//!
//! Node ids are signed: leaves are positive, internal nodes negative, and 0
//! means "no node".
//!
//! # Usage
//!
//! ```
//! use bptree::btree::BPlusTree;
//! use bptree::config::TreeConfig;
//! use bptree::holder::{IntHolder, NullHolder};
//!
//! let tree: BPlusTree<IntHolder, NullHolder> =
//!     BPlusTree::with_defaults(TreeConfig::fixed_order(3)).expect("create tree");
//!
//! for i in 1..=7 {
//!     tree.insert(IntHolder(i), NullHolder).expect("insert");
//! }
//!
//! assert_eq!(tree.height().expect("height"), 2);
//! assert_eq!(tree.first_key().expect("first"), Some(IntHolder(1)));
//! ```

mod check;
mod node;
mod order;
mod paged;
mod store;
mod tree;

pub use node::{InternalNode, LeafNode, Node, NodeId, NodeType};
pub use order::{MIN_ORDER, NODE_ID_SIZE, Order};
pub use paged::{PAGE_HEADER_SIZE, PagedNodeStore, decode_page, encode_page};
pub use store::{IdAllocator, MemoryNodeStore, NodeStore, StoreError};
pub use tree::{BPlusTree, RangeIter, TreeError};
