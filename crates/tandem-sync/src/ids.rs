//! Network id allocation per object category.

use std::collections::HashMap;

use tandem_net::messages::NetId;

/// Categories with independent id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdCategory {
    /// Items lying in the world.
    DroppedItem,
    /// Host-simulated AI actors.
    AiActor,
    /// Shared loot containers.
    LootContainer,
    /// Breakable props.
    Destructible,
}

/// Monotonic allocator. Ids are never reused while the category still has
/// live objects; a category may only restart once it is empty.
#[derive(Debug, Default)]
pub struct NetIdAllocator {
    next: HashMap<IdCategory, u32>,
    live: HashMap<IdCategory, usize>,
}

impl NetIdAllocator {
    /// Fresh allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id in `category`. Zero is skipped on wrap-around.
    pub fn allocate(&mut self, category: IdCategory) -> NetId {
        let next = self.next.entry(category).or_insert(1);
        if *next == 0 {
            *next = 1;
        }
        let id = NetId(*next);
        *next = next.wrapping_add(1);
        *self.live.entry(category).or_insert(0) += 1;
        id
    }

    /// Mark one id of `category` released. When the category empties its
    /// counter restarts.
    pub fn release(&mut self, category: IdCategory) {
        let live = self.live.entry(category).or_insert(0);
        *live = live.saturating_sub(1);
        if *live == 0 {
            self.next.remove(&category);
        }
    }

    /// Number of live ids in `category`.
    pub fn live(&self, category: IdCategory) -> usize {
        self.live.get(&category).copied().unwrap_or(0)
    }
}
