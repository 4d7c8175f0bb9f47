//! Branching factor selection.
//!
//! The order is either given directly or derived from a block size and the
//! encoded sizes of the key and value types:
//!
//! ```text
//! leaf     = max(3, block / (key + value))
//! internal = max(3, block / (key + NODE_ID_SIZE))
//! ```
//!
//! It is fixed when the tree is built.

use crate::btree::tree::TreeError;

/// Smallest order for which splitting is well defined.
pub const MIN_ORDER: usize = 3;

/// Encoded width of a node id in bytes.
pub const NODE_ID_SIZE: usize = 4;

/// Maximum keys per leaf and maximum children per internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub leaf: usize,
    pub internal: usize,
}

impl Order {
    /// Compute the order.
    ///
    /// With `auto_tune` unset, `size` is the order for both node kinds and
    /// must be at least [`MIN_ORDER`]. Otherwise `size` is a block size in
    /// bytes and `key_size`/`value_size` are the encoded entry sizes.
    pub fn tune(
        auto_tune: bool,
        size: usize,
        key_size: usize,
        value_size: usize,
    ) -> Result<Self, TreeError> {
        if !auto_tune {
            if size < MIN_ORDER {
                return Err(TreeError::InvalidConfiguration(format!(
                    "order {size} is below the minimum of {MIN_ORDER}"
                )));
            }
            return Ok(Self {
                leaf: size,
                internal: size,
            });
        }

        if size == 0 {
            return Err(TreeError::InvalidConfiguration(
                "block size must be positive".to_string(),
            ));
        }
        let leaf_entry = key_size + value_size;
        if leaf_entry == 0 {
            return Err(TreeError::InvalidConfiguration(
                "key and value types are both zero-sized".to_string(),
            ));
        }

        Ok(Self {
            leaf: (size / leaf_entry).max(MIN_ORDER),
            internal: (size / (key_size + NODE_ID_SIZE)).max(MIN_ORDER),
        })
    }

    /// Minimum keys in a non-root leaf.
    #[must_use]
    pub const fn min_leaf(self) -> usize {
        self.leaf.div_ceil(2)
    }

    /// Minimum children in a non-root internal node.
    #[must_use]
    pub const fn min_internal(self) -> usize {
        self.internal.div_ceil(2)
    }
}
