//! In-memory reference world.
//!
//! [`MemoryWorld`] implements every collaborator trait over a generational
//! arena. Spawns complete on a later [`EntityFactory::poll_spawns`] call, and
//! entities whose autonomous health initialization is left enabled receive a
//! default value on the poll after they appear. Used by the demo and by the
//! integration tests.

use std::collections::{BTreeMap, VecDeque};

use glam::Vec3;
use tandem_net::item::ItemTree;
use tandem_net::messages::AnimState;

use crate::scene::same_map;
use crate::world::{
    ActorAccess, ActorInfo, AiAppearance, BuffAccess, EntityFactory, EntityRef, GameWorld,
    Health, HealthAccess, InventoryAccess, PlayerAppearance, SceneAccess, SpawnKind,
    SpawnRequest, SpawnTicket, WorldEvent,
};

/// Value the simulation gives an entity whose health it initializes itself.
pub const AUTONOMOUS_HEALTH: Health = Health::new(100.0, 100.0);

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// What an arena object is.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    /// The local player.
    LocalPlayer,
    /// Stand-in for a remote player.
    Replica {
        /// Remote endpoint id.
        endpoint_id: String,
    },
    /// AI actor.
    Ai,
    /// Loot container.
    Container,
}

/// Slot storage of an inventory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryInventory {
    /// Slot count.
    pub capacity: u16,
    /// Occupied slots.
    pub slots: BTreeMap<u16, ItemTree>,
    /// Only the owner may touch it.
    pub private: bool,
}

/// One arena object.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntity {
    /// Kind.
    pub kind: EntityKind,
    /// Owning scene.
    pub scene_id: String,
    /// Position.
    pub position: Vec3,
    /// Facing.
    pub facing: Vec3,
    /// Active flag.
    pub enabled: bool,
    /// Animation parameters.
    pub anim: AnimState,
    /// Health component.
    pub health: Option<Health>,
    /// Whether the simulation initializes health on its own.
    pub autonomous_init: bool,
    /// Whether change events are emitted.
    pub subscribed: bool,
    /// Health bar visible.
    pub health_ui: bool,
    /// Calls to `ensure_health_ui` before the bar turns visible.
    pub health_ui_delay: u32,
    /// AI appearance.
    pub appearance: Option<AiAppearance>,
    /// Inventory component.
    pub inventory: Option<MemoryInventory>,
    /// Applied buffs as `(buff_id, duration)`.
    pub buffs: Vec<(i32, f32)>,
    /// Replayed attack swings.
    pub attacks: Vec<u8>,
}

impl MemoryEntity {
    fn new(kind: EntityKind, scene_id: &str, position: Vec3, facing: Vec3) -> Self {
        Self {
            kind,
            scene_id: scene_id.to_string(),
            position,
            facing,
            enabled: true,
            anim: AnimState::default(),
            health: None,
            autonomous_init: true,
            subscribed: false,
            health_ui: false,
            health_ui_delay: 0,
            appearance: None,
            inventory: None,
            buffs: Vec::new(),
            attacks: Vec::new(),
        }
    }

    fn is_actor(&self) -> bool {
        !matches!(self.kind, EntityKind::Container)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    entity: Option<MemoryEntity>,
}

#[derive(Debug, Clone)]
struct QueuedSpawn {
    ticket: SpawnTicket,
    request: SpawnRequest,
    polls_left: u32,
}

// ---------------------------------------------------------------------------
// MemoryWorld
// ---------------------------------------------------------------------------

/// Arena-backed game world.
#[derive(Debug, Clone)]
pub struct MemoryWorld {
    scene_id: String,
    in_game: bool,
    slots: Vec<Slot>,
    free: Vec<u32>,
    queue: VecDeque<QueuedSpawn>,
    next_ticket: u64,
    spawn_delay: u32,
    events: Vec<WorldEvent>,
    local_player: Option<EntityRef>,
    appearance: PlayerAppearance,
    scene_requests: Vec<String>,
}

impl MemoryWorld {
    /// Empty world with `scene_id` loaded.
    pub fn new(scene_id: &str) -> Self {
        Self {
            scene_id: scene_id.to_string(),
            in_game: !scene_id.is_empty(),
            slots: Vec::new(),
            free: Vec::new(),
            queue: VecDeque::new(),
            next_ticket: 1,
            spawn_delay: 1,
            events: Vec::new(),
            local_player: None,
            appearance: PlayerAppearance::default(),
            scene_requests: Vec::new(),
        }
    }

    /// Number of `poll_spawns` calls a spawn takes to complete (at least 1).
    pub fn set_spawn_delay(&mut self, polls: u32) {
        self.spawn_delay = polls.max(1);
    }

    /// Borrow an entity.
    pub fn entity(&self, entity: EntityRef) -> Option<&MemoryEntity> {
        self.slots
            .get(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    /// Mutably borrow an entity.
    pub fn entity_mut(&mut self, entity: EntityRef) -> Option<&mut MemoryEntity> {
        self.slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    /// Every live handle, in arena order.
    pub fn entities(&self) -> Vec<EntityRef> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entity.is_some())
            .map(|(index, slot)| EntityRef {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Live replicas of remote players, by endpoint id.
    pub fn replicas(&self) -> Vec<(String, EntityRef)> {
        self.entities()
            .into_iter()
            .filter_map(|e| match &self.entity(e)?.kind {
                EntityKind::Replica { endpoint_id } => Some((endpoint_id.clone(), e)),
                _ => None,
            })
            .collect()
    }

    /// Spawns still in flight.
    pub fn pending_spawns(&self) -> usize {
        self.queue.len()
    }

    /// Scene changes requested through [`SceneAccess::request_scene_change`].
    pub fn scene_requests(&self) -> &[String] {
        &self.scene_requests
    }

    /// Set the local player's appearance.
    pub fn set_local_appearance(&mut self, appearance: PlayerAppearance) {
        self.appearance = appearance;
    }

    fn insert(&mut self, entity: MemoryEntity) -> EntityRef {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.entity = Some(entity);
                EntityRef {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                });
                EntityRef {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn remove(&mut self, entity: EntityRef) -> Option<MemoryEntity> {
        let slot = self
            .slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)?;
        let removed = slot.entity.take();
        if removed.is_some() {
            self.free.push(entity.index);
        }
        removed
    }

    fn inventory(&self, inventory: EntityRef) -> Option<&MemoryInventory> {
        self.entity(inventory)?.inventory.as_ref()
    }

    fn inventory_mut(&mut self, inventory: EntityRef) -> Option<&mut MemoryInventory> {
        self.entity_mut(inventory)?.inventory.as_mut()
    }

    fn changed(&mut self, inventory: EntityRef) {
        self.events.push(WorldEvent::InventoryChanged { inventory });
    }

    fn set_health_inner(&mut self, entity: EntityRef, health: Health) -> bool {
        let Some(e) = self.entity_mut(entity) else {
            return false;
        };
        let before = e.health;
        e.health = Some(health);
        let subscribed = e.subscribed;
        if subscribed && before != Some(health) {
            self.events
                .push(WorldEvent::HealthChanged { entity, health });
        }
        true
    }

    // -- Simulation-side helpers ----------------------------------------------

    /// Create the local player with an inventory of `capacity` slots.
    pub fn spawn_local_player(&mut self, position: Vec3, health: Health, capacity: u16) -> EntityRef {
        let mut player = MemoryEntity::new(EntityKind::LocalPlayer, &self.scene_id, position, Vec3::Z);
        player.health = Some(health);
        player.health_ui = true;
        player.inventory = Some(MemoryInventory {
            capacity,
            slots: BTreeMap::new(),
            private: true,
        });
        let entity = self.insert(player);
        self.local_player = Some(entity);
        entity
    }

    /// The simulation spawns an AI actor and announces it.
    pub fn spawn_ai(&mut self, appearance: AiAppearance, position: Vec3, health: Health) -> EntityRef {
        let entity = self.place_ai(appearance, position, health);
        self.events.push(WorldEvent::ActorSpawned { entity });
        entity
    }

    /// Place an AI actor without announcing it, as scene loading does.
    pub fn place_ai(&mut self, appearance: AiAppearance, position: Vec3, health: Health) -> EntityRef {
        let mut ai = MemoryEntity::new(EntityKind::Ai, &self.scene_id, position, Vec3::Z);
        ai.health = Some(health);
        ai.appearance = Some(appearance);
        self.insert(ai)
    }

    /// Place a container without announcing it.
    pub fn place_container(&mut self, position: Vec3, capacity: u16, private: bool) -> EntityRef {
        let mut container =
            MemoryEntity::new(EntityKind::Container, &self.scene_id, position, Vec3::Z);
        container.autonomous_init = false;
        container.inventory = Some(MemoryInventory {
            capacity,
            slots: BTreeMap::new(),
            private,
        });
        self.insert(container)
    }

    /// A dying actor drops a loot container filled with `items`.
    pub fn spawn_lootbox(
        &mut self,
        source_actor: Option<EntityRef>,
        position: Vec3,
        capacity: u16,
        items: Vec<ItemTree>,
    ) -> EntityRef {
        let container = self.place_container(position, capacity, false);
        for item in items {
            if self.add_item(container, None, item).is_err() {
                tracing::warn!("lootbox {container} full");
                break;
            }
        }
        self.events.push(WorldEvent::ContainerSpawned {
            container,
            source_actor,
        });
        container
    }

    /// The simulation damages the local player.
    pub fn damage_local_player(&mut self, amount: f32) -> Option<Health> {
        let player = self.local_player?;
        let health = self.health(player)?;
        let after = Health::new(health.max, (health.current - amount).max(0.0));
        self.set_health_inner(player, after);
        self.events.push(WorldEvent::SelfDamaged { health: after });
        Some(after)
    }

    /// The local player hits `target`.
    pub fn deal_damage(&mut self, target: EntityRef, amount: f32) {
        self.events.push(WorldEvent::DamageDealt { target, amount });
    }

    /// An actor swings a weapon.
    pub fn perform_attack(&mut self, entity: EntityRef, weapon_slot: u8) {
        self.events.push(WorldEvent::AttackPerformed {
            entity,
            weapon_slot,
        });
    }

    /// An actor dies or despawns.
    pub fn kill(&mut self, entity: EntityRef) {
        if self.remove(entity).is_some() {
            self.events.push(WorldEvent::ActorDestroyed { entity });
        }
    }

    /// Load another scene. Everything but the local player is unloaded.
    pub fn change_scene(&mut self, scene_id: &str) {
        self.scene_id = scene_id.to_string();
        self.in_game = !scene_id.is_empty();
        let keep = self.local_player;
        for entity in self.entities() {
            if Some(entity) != keep {
                self.remove(entity);
            }
        }
        self.queue.clear();
        if let Some(player) = keep
            && let Some(e) = self.entity_mut(player)
        {
            e.scene_id = scene_id.to_string();
        }
        self.events.push(WorldEvent::SceneChanged {
            scene_id: scene_id.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

impl EntityFactory for MemoryWorld {
    fn request_spawn(&mut self, request: SpawnRequest) -> SpawnTicket {
        let ticket = SpawnTicket(self.next_ticket);
        self.next_ticket += 1;
        self.queue.push_back(QueuedSpawn {
            ticket,
            request,
            polls_left: self.spawn_delay,
        });
        ticket
    }

    fn poll_spawns(&mut self) -> Vec<(SpawnTicket, EntityRef)> {
        // Entities spawned on an earlier poll finish their own initialization.
        for entity in self.entities() {
            let needs_init = self
                .entity(entity)
                .is_some_and(|e| e.is_actor() && e.autonomous_init && e.health.is_none());
            if needs_init {
                self.set_health_inner(entity, AUTONOMOUS_HEALTH);
            }
        }

        let mut done = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.queue.len());
        while let Some(mut queued) = self.queue.pop_front() {
            queued.polls_left = queued.polls_left.saturating_sub(1);
            if queued.polls_left > 0 {
                waiting.push_back(queued);
                continue;
            }
            let SpawnRequest {
                kind,
                scene_id,
                position,
                facing,
            } = queued.request;
            let entity = match kind {
                SpawnKind::PlayerReplica { endpoint_id, .. } => MemoryEntity::new(
                    EntityKind::Replica { endpoint_id },
                    &scene_id,
                    position,
                    facing,
                ),
                SpawnKind::AiActor { appearance } => {
                    let mut ai = MemoryEntity::new(EntityKind::Ai, &scene_id, position, facing);
                    ai.appearance = Some(appearance);
                    ai
                }
                SpawnKind::LootContainer { capacity } => {
                    let mut c =
                        MemoryEntity::new(EntityKind::Container, &scene_id, position, facing);
                    c.autonomous_init = false;
                    c.inventory = Some(MemoryInventory {
                        capacity,
                        ..Default::default()
                    });
                    c
                }
            };
            done.push((queued.ticket, self.insert(entity)));
        }
        self.queue = waiting;
        done
    }

    fn destroy(&mut self, entity: EntityRef) {
        self.remove(entity);
    }

    fn is_alive(&self, entity: EntityRef) -> bool {
        self.entity(entity).is_some()
    }
}

impl HealthAccess for MemoryWorld {
    fn health(&self, entity: EntityRef) -> Option<Health> {
        self.entity(entity)?.health
    }

    fn force_set_health(&mut self, entity: EntityRef, health: Health) -> bool {
        self.set_health_inner(entity, health)
    }

    fn set_autonomous_init(&mut self, entity: EntityRef, enabled: bool) {
        if let Some(e) = self.entity_mut(entity) {
            e.autonomous_init = enabled;
        }
    }

    fn subscribe_health(&mut self, entity: EntityRef) -> bool {
        match self.entity_mut(entity) {
            Some(e) => {
                e.subscribed = true;
                true
            }
            None => false,
        }
    }

    fn unsubscribe_health(&mut self, entity: EntityRef) {
        if let Some(e) = self.entity_mut(entity) {
            e.subscribed = false;
        }
    }

    fn ensure_health_ui(&mut self, entity: EntityRef) -> bool {
        let Some(e) = self.entity_mut(entity) else {
            return false;
        };
        if e.health_ui_delay > 0 {
            e.health_ui_delay -= 1;
            return false;
        }
        e.health_ui = e.health.is_some();
        e.health_ui
    }

    fn apply_damage(&mut self, entity: EntityRef, amount: f32) -> bool {
        let Some(health) = self.health(entity) else {
            return false;
        };
        let after = Health::new(health.max, (health.current - amount).max(0.0));
        self.set_health_inner(entity, after)
    }
}

impl InventoryAccess for MemoryWorld {
    fn capacity(&self, inventory: EntityRef) -> Option<u16> {
        self.inventory(inventory).map(|inv| inv.capacity)
    }

    fn set_capacity(&mut self, inventory: EntityRef, capacity: u16) {
        if let Some(inv) = self.inventory_mut(inventory) {
            inv.capacity = capacity;
            inv.slots.retain(|slot, _| *slot < capacity);
        }
    }

    fn item_at(&self, inventory: EntityRef, slot: u16) -> Option<ItemTree> {
        self.inventory(inventory)?.slots.get(&slot).cloned()
    }

    fn add_item(
        &mut self,
        inventory: EntityRef,
        slot: Option<u16>,
        item: ItemTree,
    ) -> Result<u16, ItemTree> {
        let Some(inv) = self.inventory_mut(inventory) else {
            return Err(item);
        };
        let target = match slot {
            Some(slot) if slot < inv.capacity && !inv.slots.contains_key(&slot) => slot,
            Some(_) => return Err(item),
            None => match (0..inv.capacity).find(|s| !inv.slots.contains_key(s)) {
                Some(free) => free,
                None => return Err(item),
            },
        };
        inv.slots.insert(target, item);
        self.changed(inventory);
        Ok(target)
    }

    fn remove_at(&mut self, inventory: EntityRef, slot: u16) -> Option<ItemTree> {
        let item = self.inventory_mut(inventory)?.slots.remove(&slot)?;
        self.changed(inventory);
        Some(item)
    }

    fn replace_at(
        &mut self,
        inventory: EntityRef,
        slot: u16,
        item: ItemTree,
    ) -> Result<(), ItemTree> {
        let Some(existing) = self
            .inventory_mut(inventory)
            .and_then(|inv| inv.slots.get_mut(&slot))
        else {
            return Err(item);
        };
        *existing = item;
        self.changed(inventory);
        Ok(())
    }

    fn clear(&mut self, inventory: EntityRef) {
        let had_items = self
            .inventory_mut(inventory)
            .map(|inv| {
                let had = !inv.slots.is_empty();
                inv.slots.clear();
                had
            })
            .unwrap_or(false);
        if had_items {
            self.changed(inventory);
        }
    }

    fn items(&self, inventory: EntityRef) -> Vec<(u16, ItemTree)> {
        self.inventory(inventory)
            .map(|inv| inv.slots.iter().map(|(s, i)| (*s, i.clone())).collect())
            .unwrap_or_default()
    }

    fn is_private(&self, inventory: EntityRef) -> bool {
        self.inventory(inventory).is_some_and(|inv| inv.private)
    }

    fn container_position(&self, inventory: EntityRef) -> Option<Vec3> {
        self.entity(inventory)
            .filter(|e| e.kind == EntityKind::Container)
            .map(|e| e.position)
    }

    fn find_container_near(
        &self,
        scene_id: &str,
        position: Vec3,
        radius: f32,
    ) -> Option<EntityRef> {
        self.entities()
            .into_iter()
            .filter_map(|handle| {
                let e = self.entity(handle)?;
                if e.kind != EntityKind::Container || !same_map(&e.scene_id, scene_id) {
                    return None;
                }
                let distance = e.position.distance(position);
                (distance <= radius).then_some((distance, handle))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, handle)| handle)
    }
}

impl ActorAccess for MemoryWorld {
    fn actors(&self) -> Vec<ActorInfo> {
        self.entities()
            .into_iter()
            .filter_map(|e| self.actor(e))
            .collect()
    }

    fn actor(&self, entity: EntityRef) -> Option<ActorInfo> {
        let e = self.entity(entity).filter(|e| e.is_actor())?;
        Some(ActorInfo {
            entity,
            position: e.position,
            facing: e.facing,
            enabled: e.enabled,
            is_player: e.kind == EntityKind::LocalPlayer,
            is_replica: matches!(e.kind, EntityKind::Replica { .. }),
            anim: e.anim,
        })
    }

    fn set_transform(&mut self, entity: EntityRef, position: Vec3, facing: Vec3) {
        if let Some(e) = self.entity_mut(entity) {
            e.position = position;
            e.facing = facing;
        }
    }

    fn set_animation(&mut self, entity: EntityRef, anim: AnimState) {
        if let Some(e) = self.entity_mut(entity) {
            e.anim = anim;
        }
    }

    fn appearance(&self, entity: EntityRef) -> Option<AiAppearance> {
        self.entity(entity)?.appearance.clone()
    }

    fn apply_loadout(&mut self, entity: EntityRef, appearance: &AiAppearance) {
        if let Some(e) = self.entity_mut(entity) {
            e.appearance = Some(appearance.clone());
        }
    }

    fn play_attack(&mut self, entity: EntityRef, weapon_slot: u8) {
        if let Some(e) = self.entity_mut(entity) {
            e.attacks.push(weapon_slot);
        }
    }

    fn is_real_actor(&self, entity: EntityRef) -> bool {
        self.entity(entity)
            .is_some_and(|e| e.kind == EntityKind::Ai && e.enabled)
    }
}

impl SceneAccess for MemoryWorld {
    fn current_scene_id(&self) -> String {
        self.scene_id.clone()
    }

    fn in_game(&self) -> bool {
        self.in_game
    }

    fn local_player(&self) -> Option<EntityRef> {
        self.local_player.filter(|p| self.is_alive(*p))
    }

    fn local_inventory(&self) -> Option<EntityRef> {
        self.local_player()
            .filter(|p| self.inventory(*p).is_some())
    }

    fn local_appearance(&self) -> PlayerAppearance {
        self.appearance.clone()
    }

    fn request_scene_change(&mut self, scene_id: &str) {
        self.scene_requests.push(scene_id.to_string());
    }
}

impl BuffAccess for MemoryWorld {
    fn apply_buff(&mut self, entity: EntityRef, buff_id: i32, duration: f32) -> bool {
        match self.entity_mut(entity).filter(|e| e.is_actor()) {
            Some(e) => {
                e.buffs.push((buff_id, duration));
                true
            }
            None => false,
        }
    }
}

impl GameWorld for MemoryWorld {
    fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica_request(id: &str) -> SpawnRequest {
        SpawnRequest {
            kind: SpawnKind::PlayerReplica {
                endpoint_id: id.to_string(),
                display_name: id.to_string(),
            },
            scene_id: "level_01".to_string(),
            position: Vec3::ZERO,
            facing: Vec3::Z,
        }
    }

    #[test]
    fn test_spawn_completes_on_later_poll() {
        let mut world = MemoryWorld::new("level_01");
        world.set_spawn_delay(2);
        let ticket = world.request_spawn(replica_request("p1"));
        assert!(world.poll_spawns().is_empty());
        let done = world.poll_spawns();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, ticket);
        assert!(world.is_alive(done[0].1));
    }

    #[test]
    fn test_stale_handle_does_not_alias() {
        let mut world = MemoryWorld::new("level_01");
        let a = world.place_container(Vec3::ZERO, 4, false);
        world.destroy(a);
        let b = world.place_container(Vec3::ZERO, 4, false);
        assert_eq!(a.index, b.index);
        assert!(!world.is_alive(a));
        assert!(world.is_alive(b));
    }

    #[test]
    fn test_autonomous_init_can_be_disabled() {
        let mut world = MemoryWorld::new("level_01");
        world.request_spawn(replica_request("p1"));
        world.request_spawn(replica_request("p2"));
        let done = world.poll_spawns();
        let (a, b) = (done[0].1, done[1].1);
        world.set_autonomous_init(b, false);
        world.poll_spawns();
        assert_eq!(world.health(a), Some(AUTONOMOUS_HEALTH));
        assert_eq!(world.health(b), None);
    }

    #[test]
    fn test_inventory_slots() {
        let mut world = MemoryWorld::new("level_01");
        let c = world.place_container(Vec3::ZERO, 2, false);
        assert_eq!(world.add_item(c, Some(1), ItemTree::simple(5, 1)), Ok(1));
        assert_eq!(world.add_item(c, None, ItemTree::simple(6, 1)), Ok(0));
        assert!(world.add_item(c, None, ItemTree::simple(7, 1)).is_err());
        assert!(world.add_item(c, Some(9), ItemTree::simple(7, 1)).is_err());
        assert_eq!(world.remove_at(c, 1).map(|i| i.type_id), Some(5));
        assert_eq!(world.items(c).len(), 1);
        let changes = world
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, WorldEvent::InventoryChanged { .. }))
            .count();
        assert_eq!(changes, 3);
    }

    #[test]
    fn test_health_events_only_when_subscribed() {
        let mut world = MemoryWorld::new("level_01");
        let ai = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        world.apply_damage(ai, 5.0);
        assert!(world.drain_events().is_empty());
        world.subscribe_health(ai);
        world.apply_damage(ai, 5.0);
        assert_eq!(
            world.drain_events(),
            vec![WorldEvent::HealthChanged {
                entity: ai,
                health: Health::new(40.0, 30.0)
            }]
        );
    }

    #[test]
    fn test_find_container_near_picks_nearest() {
        let mut world = MemoryWorld::new("Level_01_Day");
        let far = world.place_container(Vec3::new(0.8, 0.0, 0.0), 4, false);
        let near = world.place_container(Vec3::new(0.2, 0.0, 0.0), 4, false);
        assert_eq!(world.find_container_near("level-01", Vec3::ZERO, 1.0), Some(near));
        world.destroy(near);
        assert_eq!(world.find_container_near("level_01", Vec3::ZERO, 1.0), Some(far));
        assert_eq!(world.find_container_near("level_02", Vec3::ZERO, 1.0), None);
    }
}
