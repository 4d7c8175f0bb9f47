// Layers, bottom up:
//  - holder: how keys and values encode and order themselves
//  - btree::node / btree::store: node model and where nodes live
//  - btree::order: node capacity, fixed or sized to a block
//  - btree::tree: search, insert/split, remove/merge, scans
//
// Callers build a tree from a `TreeConfig` plus blank factories for the key
// and value types, then share it across threads by reference.

pub mod btree;
pub mod config;
pub mod holder;
#[cfg(test)]
mod testing;

pub use btree::{BPlusTree, MemoryNodeStore, NodeStore, PagedNodeStore, TreeError};
pub use config::TreeConfig;
pub use holder::Holder;
