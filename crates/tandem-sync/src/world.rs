//! Narrow interfaces onto the game simulation.
//!
//! The sync core never touches the simulation's object graph directly. It
//! reads and writes through these traits, all called synchronously from the
//! tick thread, and learns about local changes from [`GameWorld::drain_events`].

use glam::Vec3;
use tandem_net::item::ItemTree;
use tandem_net::messages::{AnimState, NetId};

/// Stable handle to a simulation object: arena index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    /// Arena slot.
    pub index: u32,
    /// Slot generation; stale handles never alias a newer object.
    pub generation: u32,
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}v{}", self.index, self.generation)
    }
}

/// Handle for an asynchronous spawn, completed by [`EntityFactory::poll_spawns`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpawnTicket(pub u64);

/// What a replication subsystem made of a completed spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnResolution {
    /// The ticket belongs to another subsystem.
    NotMine,
    /// The fresh entity now mirrors a network id.
    Bound(NetId, EntityRef),
    /// The target went away meanwhile; the entity was destroyed.
    Discarded,
}

/// Health value pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    /// Maximum health. Non-positive means "not initialized".
    pub max: f32,
    /// Current health.
    pub current: f32,
}

impl Health {
    /// Construct a value pair.
    pub const fn new(max: f32, current: f32) -> Self {
        Self { max, current }
    }

    /// Whether the value describes an initialized entity.
    pub fn is_valid(self) -> bool {
        self.max > 0.0 && self.max.is_finite() && self.current.is_finite()
    }
}

/// What to spawn.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnKind {
    /// Visual stand-in for a remote player.
    PlayerReplica {
        /// Remote player's endpoint id.
        endpoint_id: String,
        /// Name to display.
        display_name: String,
    },
    /// Locally simulated copy of a host AI actor.
    AiActor {
        /// Appearance to instantiate.
        appearance: AiAppearance,
    },
    /// Loot container mirror.
    LootContainer {
        /// Slot count.
        capacity: u16,
    },
}

/// A spawn request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    /// Object kind.
    pub kind: SpawnKind,
    /// Scene the object belongs to.
    pub scene_id: String,
    /// Initial position.
    pub position: Vec3,
    /// Initial facing.
    pub facing: Vec3,
}

/// Appearance of an AI actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiAppearance {
    /// Model asset key.
    pub model_key: String,
    /// Weapon item type ids.
    pub weapons: Vec<i32>,
    /// Opaque face preset.
    pub face: Vec<u8>,
}

/// Appearance of the local player, replicated through status messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerAppearance {
    /// Opaque cosmetic payload.
    pub cosmetic: Vec<u8>,
    /// Equipped item type ids.
    pub equipment: Vec<i32>,
    /// Weapon item type ids.
    pub weapons: Vec<i32>,
}

/// Snapshot of an actor's replicated state.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorInfo {
    /// Handle.
    pub entity: EntityRef,
    /// World position.
    pub position: Vec3,
    /// Facing direction.
    pub facing: Vec3,
    /// Whether the actor is active.
    pub enabled: bool,
    /// The local player.
    pub is_player: bool,
    /// A replica of a remote player.
    pub is_replica: bool,
    /// Current animation parameters.
    pub anim: AnimState,
}

/// Something that changed in the simulation since the last drain.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// Health of a subscribed entity changed.
    HealthChanged {
        /// Entity.
        entity: EntityRef,
        /// New value.
        health: Health,
    },
    /// The local player was damaged by local simulation.
    SelfDamaged {
        /// Value after the damage.
        health: Health,
    },
    /// An inventory or container changed.
    InventoryChanged {
        /// Inventory owner.
        inventory: EntityRef,
    },
    /// The simulation spawned an actor on its own.
    ActorSpawned {
        /// New actor.
        entity: EntityRef,
    },
    /// An actor was removed.
    ActorDestroyed {
        /// Removed actor.
        entity: EntityRef,
    },
    /// An actor swung a weapon.
    AttackPerformed {
        /// Attacker.
        entity: EntityRef,
        /// Weapon slot used.
        weapon_slot: u8,
    },
    /// The local player damaged another entity.
    DamageDealt {
        /// Victim.
        target: EntityRef,
        /// Damage amount.
        amount: f32,
    },
    /// The simulation created a loot container.
    ContainerSpawned {
        /// Container.
        container: EntityRef,
        /// Actor whose death produced it, if any.
        source_actor: Option<EntityRef>,
    },
    /// The local scene changed.
    SceneChanged {
        /// New raw scene id.
        scene_id: String,
    },
}

/// Object lifetime.
pub trait EntityFactory {
    /// Start spawning an object.
    fn request_spawn(&mut self, request: SpawnRequest) -> SpawnTicket;
    /// Spawns completed since the last poll.
    fn poll_spawns(&mut self) -> Vec<(SpawnTicket, EntityRef)>;
    /// Destroy an object. Unknown handles are ignored.
    fn destroy(&mut self, entity: EntityRef);
    /// Whether the handle still names a live object.
    fn is_alive(&self, entity: EntityRef) -> bool;
}

/// Health component access.
pub trait HealthAccess {
    /// Current value, `None` when the entity has no health component.
    fn health(&self, entity: EntityRef) -> Option<Health>;
    /// Overwrite the value. Returns `false` when the entity has no health.
    fn force_set_health(&mut self, entity: EntityRef, health: Health) -> bool;
    /// Toggle the simulation's own initialization of the health component.
    fn set_autonomous_init(&mut self, entity: EntityRef, enabled: bool);
    /// Start emitting [`WorldEvent::HealthChanged`] for the entity.
    fn subscribe_health(&mut self, entity: EntityRef) -> bool;
    /// Stop emitting change events.
    fn unsubscribe_health(&mut self, entity: EntityRef);
    /// Make the health bar visible. Returns `true` once it is.
    fn ensure_health_ui(&mut self, entity: EntityRef) -> bool;
    /// Apply damage through the simulation's normal path.
    fn apply_damage(&mut self, entity: EntityRef, amount: f32) -> bool;
}

/// Inventory and container access. Inventories are owned by entities.
pub trait InventoryAccess {
    /// Slot count.
    fn capacity(&self, inventory: EntityRef) -> Option<u16>;
    /// Resize.
    fn set_capacity(&mut self, inventory: EntityRef, capacity: u16);
    /// Clone of the item at a slot.
    fn item_at(&self, inventory: EntityRef, slot: u16) -> Option<ItemTree>;
    /// Insert at `slot` or the first free slot. Hands the item back on failure.
    fn add_item(
        &mut self,
        inventory: EntityRef,
        slot: Option<u16>,
        item: ItemTree,
    ) -> Result<u16, ItemTree>;
    /// Remove and return the item at a slot.
    fn remove_at(&mut self, inventory: EntityRef, slot: u16) -> Option<ItemTree>;
    /// Overwrite an occupied slot. Hands the item back on failure.
    fn replace_at(&mut self, inventory: EntityRef, slot: u16, item: ItemTree)
    -> Result<(), ItemTree>;
    /// Remove every item.
    fn clear(&mut self, inventory: EntityRef);
    /// Every occupied slot, in slot order.
    fn items(&self, inventory: EntityRef) -> Vec<(u16, ItemTree)>;
    /// Whether the inventory is private to its owner.
    fn is_private(&self, inventory: EntityRef) -> bool;
    /// World position of a container.
    fn container_position(&self, inventory: EntityRef) -> Option<Vec3>;
    /// Nearest container in `scene_id` within `radius` of `position`.
    fn find_container_near(&self, scene_id: &str, position: Vec3, radius: f32)
    -> Option<EntityRef>;
}

/// Actor transform, animation and appearance access.
pub trait ActorAccess {
    /// Every actor in the current scene.
    fn actors(&self) -> Vec<ActorInfo>;
    /// One actor.
    fn actor(&self, entity: EntityRef) -> Option<ActorInfo>;
    /// Move an actor.
    fn set_transform(&mut self, entity: EntityRef, position: Vec3, facing: Vec3);
    /// Drive an actor's animation.
    fn set_animation(&mut self, entity: EntityRef, anim: AnimState);
    /// Appearance of an AI actor.
    fn appearance(&self, entity: EntityRef) -> Option<AiAppearance>;
    /// Re-dress an AI actor.
    fn apply_loadout(&mut self, entity: EntityRef, appearance: &AiAppearance);
    /// Replay an attack swing.
    fn play_attack(&mut self, entity: EntityRef, weapon_slot: u8);
    /// Whether the actor is a real simulated AI (not a player, replica or prop).
    fn is_real_actor(&self, entity: EntityRef) -> bool;
}

/// Local scene and player access.
pub trait SceneAccess {
    /// Raw id of the loaded scene.
    fn current_scene_id(&self) -> String;
    /// Whether a playable scene is loaded.
    fn in_game(&self) -> bool;
    /// The local player's actor.
    fn local_player(&self) -> Option<EntityRef>;
    /// Entity owning the local player's inventory.
    fn local_inventory(&self) -> Option<EntityRef>;
    /// Appearance of the local player.
    fn local_appearance(&self) -> PlayerAppearance;
    /// Ask the loader to switch scenes.
    fn request_scene_change(&mut self, scene_id: &str);
}

/// Timed status effects.
pub trait BuffAccess {
    /// Apply a buff. Returns `false` when the entity cannot take buffs.
    fn apply_buff(&mut self, entity: EntityRef, buff_id: i32, duration: f32) -> bool;
}

/// Everything the sync core needs from the simulation.
pub trait GameWorld:
    EntityFactory + HealthAccess + InventoryAccess + ActorAccess + SceneAccess + BuffAccess
{
    /// Local changes since the previous call.
    fn drain_events(&mut self) -> Vec<WorldEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_validity() {
        assert!(Health::new(40.0, 0.0).is_valid());
        assert!(!Health::new(0.0, 0.0).is_valid());
        assert!(!Health::new(-1.0, 10.0).is_valid());
        assert!(!Health::new(40.0, f32::NAN).is_valid());
    }
}
