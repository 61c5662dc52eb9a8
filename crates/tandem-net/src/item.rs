//! Nested item trees carried by loot messages.
//!
//! An item may expose named attachment slots (a weapon's scope, magazine,
//! ...) and may itself contain items (a bag). Trees received from the wire are
//! untrusted and must pass [`ItemTree::validate`] before the host rebuilds them.

use serde::{Deserialize, Serialize};

/// Maximum nesting depth accepted from the wire.
pub const MAX_ITEM_DEPTH: usize = 8;

/// Maximum total node count accepted from the wire.
pub const MAX_ITEM_NODES: usize = 512;

/// A serialized item with its attachments and contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemTree {
    /// Item type identifier. Non-positive ids are invalid.
    pub type_id: i32,
    /// Stack count, at least 1.
    pub stack: u16,
    /// Durability, `0.0..=1.0` or negative for "not applicable".
    pub durability: f32,
    /// Named attachment slots.
    pub slots: Vec<ItemSlot>,
    /// Nested inventory contents.
    pub contents: Vec<ItemTree>,
}

/// A named attachment slot on an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSlot {
    /// Slot key, unique within the owning item.
    pub key: String,
    /// Attached item, if any.
    pub item: Option<ItemTree>,
}

/// Where an item placed by a loot request comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemSource {
    /// An item the host can already see, by container and slot.
    Container {
        /// Container id.
        container: u32,
        /// Slot index inside the container.
        slot: u16,
    },
    /// A full snapshot of an item only the requester holds.
    Snapshot(ItemTree),
}

/// Reasons an item tree cannot be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemTreeError {
    /// A node has a non-positive type id.
    #[error("invalid item type {0}")]
    InvalidType(i32),
    /// A node has a zero stack count.
    #[error("empty stack for item type {0}")]
    EmptyStack(i32),
    /// Nesting exceeds [`MAX_ITEM_DEPTH`].
    #[error("item tree deeper than {MAX_ITEM_DEPTH}")]
    TooDeep,
    /// Node count exceeds [`MAX_ITEM_NODES`].
    #[error("item tree larger than {MAX_ITEM_NODES} nodes")]
    TooLarge,
    /// Two slots on one item share a key.
    #[error("duplicate slot key '{0}'")]
    DuplicateSlot(String),
}

impl ItemTree {
    /// A plain item with no slots or contents.
    pub fn simple(type_id: i32, stack: u16) -> Self {
        Self {
            type_id,
            stack,
            durability: -1.0,
            slots: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Builder: add an empty named slot.
    pub fn with_slot(mut self, key: impl Into<String>) -> Self {
        self.slots.push(ItemSlot {
            key: key.into(),
            item: None,
        });
        self
    }

    /// Look up a slot by key.
    pub fn slot(&self, key: &str) -> Option<&ItemSlot> {
        self.slots.iter().find(|s| s.key == key)
    }

    /// Mutable slot lookup by key.
    pub fn slot_mut(&mut self, key: &str) -> Option<&mut ItemSlot> {
        self.slots.iter_mut().find(|s| s.key == key)
    }

    /// Total number of nodes in the tree, including attachments and contents.
    pub fn node_count(&self) -> usize {
        1 + self
            .slots
            .iter()
            .filter_map(|s| s.item.as_ref())
            .map(ItemTree::node_count)
            .sum::<usize>()
            + self.contents.iter().map(ItemTree::node_count).sum::<usize>()
    }

    /// Check that the tree can be rebuilt on the receiving side.
    pub fn validate(&self) -> Result<(), ItemTreeError> {
        if self.node_count() > MAX_ITEM_NODES {
            return Err(ItemTreeError::TooLarge);
        }
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<(), ItemTreeError> {
        if depth >= MAX_ITEM_DEPTH {
            return Err(ItemTreeError::TooDeep);
        }
        if self.type_id <= 0 {
            return Err(ItemTreeError::InvalidType(self.type_id));
        }
        if self.stack == 0 {
            return Err(ItemTreeError::EmptyStack(self.type_id));
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if self.slots[..i].iter().any(|s| s.key == slot.key) {
                return Err(ItemTreeError::DuplicateSlot(slot.key.clone()));
            }
            if let Some(item) = &slot.item {
                item.validate_at(depth + 1)?;
            }
        }
        for child in &self.contents {
            child.validate_at(depth + 1)?;
        }
        Ok(())
    }
}
