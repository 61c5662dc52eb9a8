//! Host-authoritative loot containers.
//!
//! Only the host mutates containers. Clients remove the moved item from their
//! own inventory, record it under a request token and wait: an acknowledgment
//! consumes the token, a deny hands the item back and asks for a resync. Every
//! successful mutation is followed by a full-state broadcast, and applying a
//! full state clears and rebuilds the container so it is idempotent.
//!
//! Programmatic mutation on the host (filling a freshly dropped lootbox) opens
//! a short mute window per container; changes seen inside it are flushed as
//! one broadcast when it ends.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tandem_config::SyncConfig;
use tandem_net::item::{ItemSource, ItemTree};
use tandem_net::messages::{
    LootContainerSpawned, LootDeny, LootOpenRequest, LootPutOk, LootPutRequest,
    LootResyncRequest, LootSplitOk, LootSplitRequest, LootState, LootTakeOk, LootTakeRequest,
    Message, NetId, SlotItem, SlotPlugOk, SlotPlugRequest, SlotUnplugOk, SlotUnplugRequest,
};

use crate::error::SyncError;
use crate::ids::{IdCategory, NetIdAllocator};
use crate::outbox::{Outbox, Target};
use crate::pending::{Deferral, PendingBuffer};
use crate::scene::same_map;
use crate::world::{
    EntityRef, GameWorld, InventoryAccess, SpawnKind, SpawnRequest, SpawnResolution, SpawnTicket,
};

// ---------------------------------------------------------------------------
// Requests and deny reasons
// ---------------------------------------------------------------------------

/// Why the host refused a loot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// Container unresolvable or private.
    NoInv,
    /// Referenced weapon missing.
    BadWeapon,
    /// Slot missing.
    BadSlot,
    /// Source reference missing.
    BadSrc,
    /// Item snapshot could not be rebuilt.
    BuildFail,
    /// Insertion failed.
    PutFail,
    /// Removal failed.
    TakeFail,
    /// Stack split failed.
    SplitFail,
    /// Attachment failed.
    PlugFail,
    /// Detachment failed.
    UnplugFail,
}

impl DenyReason {
    /// Wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::NoInv => "no_inv",
            DenyReason::BadWeapon => "bad_weapon",
            DenyReason::BadSlot => "bad_slot",
            DenyReason::BadSrc => "bad_src",
            DenyReason::BuildFail => "build_fail",
            DenyReason::PutFail => "put_fail",
            DenyReason::TakeFail => "take_fail",
            DenyReason::SplitFail => "split_fail",
            DenyReason::PlugFail => "plug_fail",
            DenyReason::UnplugFail => "unplug_fail",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutating request as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum LootRequest {
    /// Put an item into a container.
    Put(LootPutRequest),
    /// Take an item out.
    Take(LootTakeRequest),
    /// Split a stack.
    Split(LootSplitRequest),
    /// Attach an item to a weapon slot.
    Plug(SlotPlugRequest),
    /// Detach an item from a weapon slot.
    Unplug(SlotUnplugRequest),
}

impl LootRequest {
    /// Target container.
    pub fn container(&self) -> NetId {
        match self {
            LootRequest::Put(r) => r.container,
            LootRequest::Take(r) => r.container,
            LootRequest::Split(r) => r.container,
            LootRequest::Plug(r) => r.container,
            LootRequest::Unplug(r) => r.container,
        }
    }

    /// Client token.
    pub fn token(&self) -> u32 {
        match self {
            LootRequest::Put(r) => r.token,
            LootRequest::Take(r) => r.token,
            LootRequest::Split(r) => r.token,
            LootRequest::Plug(r) => r.token,
            LootRequest::Unplug(r) => r.token,
        }
    }
}

/// Kind of an in-flight client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LootOp {
    /// Put.
    Put,
    /// Take.
    Take,
    /// Split.
    Split,
    /// Plug.
    Plug,
    /// Unplug.
    Unplug,
}

#[derive(Debug, Clone)]
struct Speculative {
    container: NetId,
    op: LootOp,
    /// Item removed from the local inventory for the request, if any.
    item: Option<ItemTree>,
}

#[derive(Debug, Clone, Copy)]
struct MuteWindow {
    until: Duration,
    dirty: bool,
}

// ---------------------------------------------------------------------------
// LootSync
// ---------------------------------------------------------------------------

/// Loot container registry and transaction state.
#[derive(Debug)]
pub struct LootSync {
    mute_window: Duration,
    match_radius: f32,
    by_id: HashMap<NetId, EntityRef>,
    by_entity: HashMap<EntityRef, NetId>,

    // Host side.
    mutes: HashMap<NetId, MuteWindow>,
    last_broadcast: HashMap<NetId, LootState>,
    origins: HashMap<NetId, NetId>,

    // Client side.
    next_token: u32,
    speculative: HashMap<u32, Speculative>,
    pending_states: PendingBuffer<NetId, LootState>,
    spawning: HashMap<SpawnTicket, NetId>,
}

impl LootSync {
    /// Empty registry.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            mute_window: config.loot_mute(),
            match_radius: config.container_match_radius,
            by_id: HashMap::new(),
            by_entity: HashMap::new(),
            mutes: HashMap::new(),
            last_broadcast: HashMap::new(),
            origins: HashMap::new(),
            next_token: 1,
            speculative: HashMap::new(),
            pending_states: PendingBuffer::new("loot-state"),
            spawning: HashMap::new(),
        }
    }

    /// Entity bound to a container id.
    pub fn entity_of(&self, id: NetId) -> Option<EntityRef> {
        self.by_id.get(&id).copied()
    }

    /// Container id of an entity.
    pub fn id_of(&self, entity: EntityRef) -> Option<NetId> {
        self.by_entity.get(&entity).copied()
    }

    /// Whether a container is inside its mute window.
    pub fn is_muted(&self, id: NetId) -> bool {
        self.mutes.contains_key(&id)
    }

    /// Client requests waiting for an answer.
    pub fn in_flight(&self) -> usize {
        self.speculative.len()
    }

    /// Kind of an in-flight request.
    pub fn in_flight_op(&self, token: u32) -> Option<LootOp> {
        self.speculative.get(&token).map(|s| s.op)
    }

    /// Whether a full state waits for its container.
    pub fn has_pending_state(&self, id: NetId) -> bool {
        self.pending_states.contains(&id)
    }

    fn bind(&mut self, id: NetId, entity: EntityRef) {
        self.by_id.insert(id, entity);
        self.by_entity.insert(entity, id);
    }

    /// Forget every container, as on a scene change. Host ids are released.
    pub fn reset(&mut self, ids: Option<&mut NetIdAllocator>) {
        if let Some(ids) = ids {
            for _ in self.by_id.drain() {
                ids.release(IdCategory::LootContainer);
            }
        }
        self.by_id.clear();
        self.by_entity.clear();
        self.mutes.clear();
        self.last_broadcast.clear();
        self.origins.clear();
        self.pending_states.clear();
        self.spawning.clear();
    }

    /// Full state of a container.
    pub fn snapshot(world: &impl InventoryAccess, id: NetId, entity: EntityRef) -> LootState {
        LootState {
            container: id,
            capacity: world.capacity(entity).unwrap_or(0),
            items: world
                .items(entity)
                .into_iter()
                .map(|(slot, item)| SlotItem { slot, item })
                .collect(),
        }
    }

    fn resolve(&self, world: &impl InventoryAccess, id: NetId) -> Option<EntityRef> {
        self.entity_of(id)
            .filter(|e| world.capacity(*e).is_some() && !world.is_private(*e))
    }

    // -----------------------------------------------------------------------
    // Host
    // -----------------------------------------------------------------------

    /// Register a container that just appeared on the host and announce it.
    ///
    /// `actor_id` is the AI actor it dropped from, [`NetId::INVALID`] for
    /// containers placed by the scene. The container starts muted.
    pub fn host_on_dead_lootbox_spawned<W: GameWorld>(
        &mut self,
        world: &W,
        container: EntityRef,
        actor_id: NetId,
        now: Duration,
        ids: &mut NetIdAllocator,
        outbox: &mut Outbox,
    ) -> Option<NetId> {
        if let Some(id) = self.id_of(container) {
            return Some(id);
        }
        world.capacity(container)?;
        let id = ids.allocate(IdCategory::LootContainer);
        self.bind(id, container);
        self.origins.insert(id, actor_id);
        self.mutes.insert(
            id,
            MuteWindow {
                until: now + self.mute_window,
                dirty: false,
            },
        );

        let scene_id = world.current_scene_id();
        let position = world.container_position(container).unwrap_or_default();
        tracing::info!("Loot container {id} spawned (actor {actor_id})");
        let target = Target::InScene {
            scene_id: scene_id.clone(),
            except: None,
        };
        outbox.push(
            target.clone(),
            LootContainerSpawned {
                container: id,
                actor_id,
                scene_id,
                position: position.into(),
            },
        );
        let state = Self::snapshot(world, id, container);
        self.last_broadcast.insert(id, state.clone());
        outbox.push(target, state);
        Some(id)
    }

    /// Forget a destroyed container, releasing its id.
    pub fn host_unregister(&mut self, entity: EntityRef, ids: &mut NetIdAllocator) -> Option<NetId> {
        let id = self.by_entity.remove(&entity)?;
        self.by_id.remove(&id);
        self.mutes.remove(&id);
        self.last_broadcast.remove(&id);
        self.origins.remove(&id);
        ids.release(IdCategory::LootContainer);
        Some(id)
    }

    /// Announce every registered container to a participant that just
    /// entered the scene.
    pub fn host_announce_all<W: GameWorld>(&self, world: &W, requester: &str, outbox: &mut Outbox) {
        let scene_id = world.current_scene_id();
        let mut containers: Vec<_> = self.by_id.iter().map(|(id, e)| (*id, *e)).collect();
        containers.sort_by_key(|(id, _)| *id);
        for (id, entity) in containers {
            let to = Target::Endpoint(requester.to_string());
            outbox.push(
                to.clone(),
                LootContainerSpawned {
                    container: id,
                    actor_id: self.origins.get(&id).copied().unwrap_or(NetId::INVALID),
                    scene_id: scene_id.clone(),
                    position: world.container_position(entity).unwrap_or_default().into(),
                },
            );
            outbox.push(to, Self::snapshot(world, id, entity));
        }
    }

    fn broadcast_state(
        &mut self,
        world: &impl InventoryAccess,
        id: NetId,
        entity: EntityRef,
        scene_id: &str,
        force: bool,
        outbox: &mut Outbox,
    ) {
        let state = Self::snapshot(world, id, entity);
        if !force && self.last_broadcast.get(&id) == Some(&state) {
            tracing::trace!("Container {id} unchanged since last broadcast");
            return;
        }
        self.last_broadcast.insert(id, state.clone());
        outbox.push(
            Target::InScene {
                scene_id: scene_id.to_string(),
                except: None,
            },
            state,
        );
    }

    /// A container changed on the host.
    pub fn host_on_inventory_changed(
        &mut self,
        world: &impl InventoryAccess,
        inventory: EntityRef,
        scene_id: &str,
        outbox: &mut Outbox,
    ) {
        let Some(id) = self.id_of(inventory) else {
            return;
        };
        if let Some(mute) = self.mutes.get_mut(&id) {
            mute.dirty = true;
            return;
        }
        self.broadcast_state(world, id, inventory, scene_id, false, outbox);
    }

    /// Close elapsed mute windows, flushing suppressed changes.
    pub fn host_tick(
        &mut self,
        world: &impl InventoryAccess,
        now: Duration,
        scene_id: &str,
        outbox: &mut Outbox,
    ) {
        let expired: Vec<(NetId, bool)> = self
            .mutes
            .iter()
            .filter(|(_, m)| now >= m.until)
            .map(|(id, m)| (*id, m.dirty))
            .collect();
        for (id, dirty) in expired {
            self.mutes.remove(&id);
            if dirty && let Some(entity) = self.entity_of(id) {
                self.broadcast_state(world, id, entity, scene_id, false, outbox);
            }
        }
    }

    /// Send a container's full state to one participant.
    ///
    /// Used for open requests; unknown containers are denied with `no_inv`.
    pub fn host_open(
        &self,
        world: &impl InventoryAccess,
        requester: &str,
        request: LootOpenRequest,
        outbox: &mut Outbox,
    ) {
        let to = Target::Endpoint(requester.to_string());
        match self.resolve(world, request.container) {
            Some(entity) => outbox.push(to, Self::snapshot(world, request.container, entity)),
            None => outbox.push(
                to,
                LootDeny {
                    token: 0,
                    container: request.container,
                    reason: DenyReason::NoInv.as_str().to_string(),
                },
            ),
        }
    }

    /// Resend a container's state after a client-side deny.
    pub fn host_resync(
        &self,
        world: &impl InventoryAccess,
        requester: &str,
        request: LootResyncRequest,
        outbox: &mut Outbox,
    ) {
        match self.resolve(world, request.container) {
            Some(entity) => outbox.push(
                Target::Endpoint(requester.to_string()),
                Self::snapshot(world, request.container, entity),
            ),
            None => tracing::debug!("Resync for unknown container {}", request.container),
        }
    }

    /// Validate and apply a mutating request.
    ///
    /// Success: token-keyed ack to the requester and a full-state broadcast.
    /// Failure: deny to the requester, followed by a resync when the
    /// container exists.
    pub fn host_handle(
        &mut self,
        world: &mut impl InventoryAccess,
        requester: &str,
        request: LootRequest,
        scene_id: &str,
        outbox: &mut Outbox,
    ) -> Result<(), DenyReason> {
        let id = request.container();
        let token = request.token();
        let to = Target::Endpoint(requester.to_string());
        let entity = self.resolve(&*world, id);

        let result = match entity {
            None => Err(DenyReason::NoInv),
            Some(entity) => match request {
                LootRequest::Put(r) => self.put(world, entity, r),
                LootRequest::Take(r) => take(world, entity, r),
                LootRequest::Split(r) => split(world, entity, r),
                LootRequest::Plug(r) => self.plug(world, entity, r),
                LootRequest::Unplug(r) => unplug(world, entity, r),
            },
        };

        match result {
            Ok(ack) => {
                outbox.push(to, ack);
                if let Some(entity) = entity {
                    self.broadcast_state(&*world, id, entity, scene_id, true, outbox);
                }
                Ok(())
            }
            Err(reason) => {
                tracing::warn!("Denied loot request {token} on {id} from {requester}: {reason}");
                outbox.push(
                    to.clone(),
                    LootDeny {
                        token,
                        container: id,
                        reason: reason.as_str().to_string(),
                    },
                );
                if let Some(entity) = entity {
                    outbox.push(to, Self::snapshot(&*world, id, entity));
                }
                Err(reason)
            }
        }
    }

    fn source_container(&self, world: &impl InventoryAccess, container: u32) -> Option<EntityRef> {
        self.resolve(world, NetId(container))
    }

    fn put(
        &self,
        world: &mut impl InventoryAccess,
        container: EntityRef,
        r: LootPutRequest,
    ) -> Result<Message, DenyReason> {
        let ack = |slot| {
            Message::from(LootPutOk {
                token: r.token,
                container: r.container,
                slot,
            })
        };
        match r.source {
            ItemSource::Snapshot(item) => {
                item.validate().map_err(|e| {
                    tracing::debug!("Rejecting item snapshot: {e}");
                    DenyReason::BuildFail
                })?;
                let slot = world
                    .add_item(container, r.slot, item)
                    .map_err(|_| DenyReason::PutFail)?;
                Ok(ack(slot))
            }
            ItemSource::Container {
                container: source,
                slot: source_slot,
            } => {
                let source = self
                    .source_container(&*world, source)
                    .ok_or(DenyReason::BadSrc)?;
                let item = world
                    .remove_at(source, source_slot)
                    .ok_or(DenyReason::BadSrc)?;
                match world.add_item(container, r.slot, item) {
                    Ok(slot) => Ok(ack(slot)),
                    Err(item) => {
                        if world.add_item(source, Some(source_slot), item).is_err() {
                            tracing::error!("Could not return item to slot {source_slot}");
                        }
                        Err(DenyReason::PutFail)
                    }
                }
            }
        }
    }

    fn plug(
        &self,
        world: &mut impl InventoryAccess,
        container: EntityRef,
        r: SlotPlugRequest,
    ) -> Result<Message, DenyReason> {
        let mut weapon = world
            .item_at(container, r.weapon_slot)
            .ok_or(DenyReason::BadWeapon)?;
        let occupied = weapon
            .slot(&r.slot_key)
            .ok_or(DenyReason::BadSlot)?
            .item
            .is_some();
        if occupied {
            return Err(DenyReason::PlugFail);
        }

        let (item, source) = match r.source {
            ItemSource::Snapshot(item) => {
                item.validate().map_err(|_| DenyReason::BuildFail)?;
                (item, None)
            }
            ItemSource::Container {
                container: source,
                slot,
            } => {
                let source = self
                    .source_container(&*world, source)
                    .ok_or(DenyReason::BadSrc)?;
                if source == container && slot == r.weapon_slot {
                    return Err(DenyReason::BadSrc);
                }
                let item = world.item_at(source, slot).ok_or(DenyReason::BadSrc)?;
                (item, Some((source, slot)))
            }
        };

        match weapon.slot_mut(&r.slot_key) {
            Some(slot) => slot.item = Some(item),
            None => return Err(DenyReason::BadSlot),
        }
        world
            .replace_at(container, r.weapon_slot, weapon)
            .map_err(|_| DenyReason::PlugFail)?;
        if let Some((source, slot)) = source {
            world.remove_at(source, slot);
        }
        Ok(SlotPlugOk {
            token: r.token,
            container: r.container,
        }
        .into())
    }

    // -----------------------------------------------------------------------
    // Client
    // -----------------------------------------------------------------------

    fn allocate_token(&mut self) -> u32 {
        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        if self.next_token == 0 {
            self.next_token = 1;
        }
        token
    }

    fn track(&mut self, container: NetId, op: LootOp, item: Option<ItemTree>) -> u32 {
        let token = self.allocate_token();
        self.speculative.insert(
            token,
            Speculative {
                container,
                op,
                item,
            },
        );
        token
    }

    /// Ask for a container's full state.
    pub fn client_open(&self, container: NetId, outbox: &mut Outbox) {
        outbox.push(Target::Host, LootOpenRequest { container });
    }

    /// Move an item from the local inventory into a container.
    pub fn client_put_from_inventory<W: GameWorld>(
        &mut self,
        world: &mut W,
        container: NetId,
        inventory_slot: u16,
        dest_slot: Option<u16>,
        outbox: &mut Outbox,
    ) -> Result<u32, SyncError> {
        let inventory = world.local_inventory().ok_or(SyncError::NoLocalInventory)?;
        let item = world
            .remove_at(inventory, inventory_slot)
            .ok_or(SyncError::EmptySlot(inventory_slot))?;
        let token = self.track(container, LootOp::Put, Some(item.clone()));
        outbox.push(
            Target::Host,
            LootPutRequest {
                container,
                token,
                slot: dest_slot,
                source: ItemSource::Snapshot(item),
            },
        );
        Ok(token)
    }

    /// Move an item between two containers the host can see.
    pub fn client_put_from_container(
        &mut self,
        container: NetId,
        source: NetId,
        source_slot: u16,
        dest_slot: Option<u16>,
        outbox: &mut Outbox,
    ) -> u32 {
        let token = self.track(container, LootOp::Put, None);
        outbox.push(
            Target::Host,
            LootPutRequest {
                container,
                token,
                slot: dest_slot,
                source: ItemSource::Container {
                    container: source.0,
                    slot: source_slot,
                },
            },
        );
        token
    }

    /// Take an item into the local inventory.
    pub fn client_take(&mut self, container: NetId, slot: u16, outbox: &mut Outbox) -> u32 {
        let token = self.track(container, LootOp::Take, None);
        outbox.push(
            Target::Host,
            LootTakeRequest {
                container,
                token,
                slot,
            },
        );
        token
    }

    /// Split `count` off a stack.
    pub fn client_split(
        &mut self,
        container: NetId,
        slot: u16,
        count: u16,
        dest_slot: Option<u16>,
        outbox: &mut Outbox,
    ) -> u32 {
        let token = self.track(container, LootOp::Split, None);
        outbox.push(
            Target::Host,
            LootSplitRequest {
                container,
                token,
                slot,
                count,
                dest_slot,
            },
        );
        token
    }

    /// Attach an item from the local inventory to a weapon in a container.
    pub fn client_plug_from_inventory<W: GameWorld>(
        &mut self,
        world: &mut W,
        container: NetId,
        weapon_slot: u16,
        slot_key: &str,
        inventory_slot: u16,
        outbox: &mut Outbox,
    ) -> Result<u32, SyncError> {
        let inventory = world.local_inventory().ok_or(SyncError::NoLocalInventory)?;
        let item = world
            .remove_at(inventory, inventory_slot)
            .ok_or(SyncError::EmptySlot(inventory_slot))?;
        let token = self.track(container, LootOp::Plug, Some(item.clone()));
        outbox.push(
            Target::Host,
            SlotPlugRequest {
                container,
                token,
                weapon_slot,
                slot_key: slot_key.to_string(),
                source: ItemSource::Snapshot(item),
            },
        );
        Ok(token)
    }

    /// Detach an item from a weapon into the local inventory.
    pub fn client_unplug(
        &mut self,
        container: NetId,
        weapon_slot: u16,
        slot_key: &str,
        outbox: &mut Outbox,
    ) -> u32 {
        let token = self.track(container, LootOp::Unplug, None);
        outbox.push(
            Target::Host,
            SlotUnplugRequest {
                container,
                token,
                weapon_slot,
                slot_key: slot_key.to_string(),
            },
        );
        token
    }

    /// An acknowledgment arrived. `received` is an item handed to us.
    pub fn on_ack<W: GameWorld>(
        &mut self,
        world: &mut W,
        token: u32,
        received: Option<ItemTree>,
    ) -> bool {
        let Some(spec) = self.speculative.remove(&token) else {
            tracing::debug!("Ack for unknown loot token {token}");
            return false;
        };
        tracing::trace!("Loot {:?} on {} acknowledged", spec.op, spec.container);
        if let Some(item) = received {
            give_to_local(world, item);
        }
        true
    }

    /// The host refused a request: restore and resync.
    pub fn on_deny<W: GameWorld>(&mut self, world: &mut W, deny: &LootDeny, outbox: &mut Outbox) {
        tracing::warn!(
            "Loot request {} on {} denied: {}",
            deny.token,
            deny.container,
            deny.reason
        );
        if let Some(spec) = self.speculative.remove(&deny.token)
            && let Some(item) = spec.item
        {
            give_to_local(world, item);
        }
        outbox.push(
            Target::Host,
            LootResyncRequest {
                container: deny.container,
            },
        );
    }

    /// The session ended with requests unanswered. Items taken out of the
    /// local inventory for them are handed back. Returns how many were open.
    pub fn abandon_in_flight<W: GameWorld>(&mut self, world: &mut W) -> usize {
        let open = self.speculative.len();
        for (token, spec) in self.speculative.drain() {
            tracing::debug!("Abandoning loot {:?} {token} on {}", spec.op, spec.container);
            if let Some(item) = spec.item {
                give_to_local(world, item);
            }
        }
        open
    }

    /// Apply a full state, or park it until the container is bound.
    pub fn on_state<W: GameWorld>(&mut self, world: &mut W, state: LootState) -> Deferral {
        let entity = self.entity_of(state.container).filter(|e| world.is_alive(*e));
        self.pending_states
            .apply_or_defer(state.container, state, |s| match entity {
                Some(entity) => {
                    apply_state(world, entity, &s);
                    Ok(())
                }
                None => Err(s),
            })
    }

    fn bind_client<W: GameWorld>(&mut self, world: &mut W, id: NetId, entity: EntityRef) {
        self.bind(id, entity);
        if let Some(state) = self.pending_states.take(&id) {
            apply_state(world, entity, &state);
        }
    }

    /// The host announced a container. Returns the binding if made now.
    pub fn on_container_spawned<W: GameWorld>(
        &mut self,
        world: &mut W,
        msg: LootContainerSpawned,
    ) -> Option<(NetId, EntityRef)> {
        let scene_id = world.current_scene_id();
        if !same_map(&msg.scene_id, &scene_id) || self.by_id.contains_key(&msg.container) {
            return None;
        }
        let position = msg.position.to_vec3();
        let nearby = world
            .find_container_near(&scene_id, position, self.match_radius)
            .filter(|e| !self.by_entity.contains_key(e));
        if let Some(entity) = nearby {
            self.bind_client(world, msg.container, entity);
            tracing::info!("Bound container {} to local {entity}", msg.container);
            return Some((msg.container, entity));
        }
        if !self.spawning.values().any(|id| *id == msg.container) {
            let ticket = world.request_spawn(SpawnRequest {
                kind: SpawnKind::LootContainer { capacity: 0 },
                scene_id,
                position,
                facing: glam::Vec3::Z,
            });
            self.spawning.insert(ticket, msg.container);
        }
        None
    }

    /// A spawn completed.
    pub fn on_spawned<W: GameWorld>(
        &mut self,
        world: &mut W,
        ticket: SpawnTicket,
        entity: EntityRef,
    ) -> SpawnResolution {
        let Some(id) = self.spawning.remove(&ticket) else {
            return SpawnResolution::NotMine;
        };
        if self.by_id.contains_key(&id) {
            world.destroy(entity);
            return SpawnResolution::Discarded;
        }
        self.bind_client(world, id, entity);
        SpawnResolution::Bound(id, entity)
    }
}

fn take(
    world: &mut impl InventoryAccess,
    container: EntityRef,
    r: LootTakeRequest,
) -> Result<Message, DenyReason> {
    world.item_at(container, r.slot).ok_or(DenyReason::BadSlot)?;
    let item = world
        .remove_at(container, r.slot)
        .ok_or(DenyReason::TakeFail)?;
    Ok(LootTakeOk {
        token: r.token,
        container: r.container,
        item,
    }
    .into())
}

fn split(
    world: &mut impl InventoryAccess,
    container: EntityRef,
    r: LootSplitRequest,
) -> Result<Message, DenyReason> {
    let mut item = world
        .item_at(container, r.slot)
        .ok_or(DenyReason::BadSlot)?;
    if r.count == 0 || r.count >= item.stack {
        return Err(DenyReason::SplitFail);
    }
    let mut part = item.clone();
    part.stack = r.count;
    item.stack -= r.count;
    world
        .replace_at(container, r.slot, item.clone())
        .map_err(|_| DenyReason::SplitFail)?;
    match world.add_item(container, r.dest_slot, part) {
        Ok(dest_slot) => Ok(LootSplitOk {
            token: r.token,
            container: r.container,
            dest_slot,
        }
        .into()),
        Err(_) => {
            item.stack += r.count;
            if world.replace_at(container, r.slot, item).is_err() {
                tracing::error!("Could not restore stack at slot {}", r.slot);
            }
            Err(DenyReason::SplitFail)
        }
    }
}

fn unplug(
    world: &mut impl InventoryAccess,
    container: EntityRef,
    r: SlotUnplugRequest,
) -> Result<Message, DenyReason> {
    let mut weapon = world
        .item_at(container, r.weapon_slot)
        .ok_or(DenyReason::BadWeapon)?;
    let slot = weapon.slot_mut(&r.slot_key).ok_or(DenyReason::BadSlot)?;
    let item = slot.item.take().ok_or(DenyReason::UnplugFail)?;
    world
        .replace_at(container, r.weapon_slot, weapon)
        .map_err(|_| DenyReason::UnplugFail)?;
    Ok(SlotUnplugOk {
        token: r.token,
        container: r.container,
        item,
    }
    .into())
}

fn apply_state(world: &mut impl InventoryAccess, entity: EntityRef, state: &LootState) {
    world.set_capacity(entity, state.capacity);
    world.clear(entity);
    for SlotItem { slot, item } in &state.items {
        if world.add_item(entity, Some(*slot), item.clone()).is_err() {
            tracing::warn!("Container {} state does not fit slot {slot}", state.container);
        }
    }
}

fn give_to_local<W: GameWorld>(world: &mut W, item: ItemTree) {
    let Some(inventory) = world.local_inventory() else {
        tracing::warn!("No local inventory for returned item {}", item.type_id);
        return;
    };
    if let Err(item) = world.add_item(inventory, None, item) {
        tracing::warn!("Local inventory full, item {} lost", item.type_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use crate::world::{EntityFactory, Health};
    use glam::Vec3;

    const MS: Duration = Duration::from_millis(1);

    struct Host {
        loot: LootSync,
        world: MemoryWorld,
        ids: NetIdAllocator,
        outbox: Outbox,
        box_id: NetId,
        box_entity: EntityRef,
    }

    fn host() -> Host {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let mut ids = NetIdAllocator::new();
        let mut outbox = Outbox::new();
        let box_entity = world.place_container(Vec3::new(1.0, 0.0, 2.0), 6, false);
        let box_id = loot
            .host_on_dead_lootbox_spawned(&world, box_entity, NetId::INVALID, Duration::ZERO, &mut ids, &mut outbox)
            .unwrap();
        outbox.drain();
        // Let the spawn mute window close.
        loot.host_tick(&world, Duration::from_secs(1), "level_01", &mut outbox);
        Host {
            loot,
            world,
            ids,
            outbox,
            box_id,
            box_entity,
        }
    }

    fn put(container: NetId, token: u32, item: ItemTree) -> LootRequest {
        LootRequest::Put(LootPutRequest {
            container,
            token,
            slot: None,
            source: ItemSource::Snapshot(item),
        })
    }

    fn deny_reason(out: &[crate::outbox::Outgoing]) -> Option<String> {
        out.iter().find_map(|o| match &o.message {
            Message::LootDeny(d) => Some(d.reason.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_deny_reason_wire_names() {
        assert_eq!(DenyReason::NoInv.to_string(), "no_inv");
        assert_eq!(DenyReason::UnplugFail.as_str(), "unplug_fail");
    }

    #[test]
    fn test_put_into_unknown_container_is_denied() {
        let mut h = host();
        let before = h.world.items(h.box_entity);
        let result = h.loot.host_handle(
            &mut h.world,
            "c1",
            put(NetId(99), 3, ItemTree::simple(5, 1)),
            "level_01",
            &mut h.outbox,
        );
        assert_eq!(result, Err(DenyReason::NoInv));
        let out = h.outbox.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(deny_reason(&out).as_deref(), Some("no_inv"));
        assert_eq!(h.world.items(h.box_entity), before);
    }

    #[test]
    fn test_put_snapshot_acks_then_broadcasts() {
        let mut h = host();
        let item = ItemTree::simple(5, 2);
        h.loot
            .host_handle(&mut h.world, "c1", put(h.box_id, 7, item.clone()), "level_01", &mut h.outbox)
            .unwrap();
        let out = h.outbox.drain();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].target, Target::Endpoint("c1".into()));
        assert_eq!(
            out[0].message,
            Message::LootPutOk(LootPutOk { token: 7, container: h.box_id, slot: 0 })
        );
        let Message::LootState(state) = &out[1].message else {
            panic!("expected state broadcast, got {:?}", out[1].message);
        };
        assert!(matches!(out[1].target, Target::InScene { .. }));
        assert_eq!(state.items, vec![SlotItem { slot: 0, item }]);
    }

    #[test]
    fn test_invalid_snapshot_is_build_fail_with_resync() {
        let mut h = host();
        let result = h.loot.host_handle(
            &mut h.world,
            "c1",
            put(h.box_id, 1, ItemTree::simple(-4, 1)),
            "level_01",
            &mut h.outbox,
        );
        assert_eq!(result, Err(DenyReason::BuildFail));
        let out = h.outbox.drain();
        assert_eq!(deny_reason(&out).as_deref(), Some("build_fail"));
        assert!(matches!(out[1].message, Message::LootState(_)));
        assert_eq!(out[1].target, Target::Endpoint("c1".into()));
    }

    #[test]
    fn test_private_container_is_no_inv() {
        let mut h = host();
        let private = h.world.place_container(Vec3::ZERO, 4, true);
        let id = h
            .loot
            .host_on_dead_lootbox_spawned(&h.world, private, NetId(3), Duration::ZERO, &mut h.ids, &mut h.outbox)
            .unwrap();
        h.outbox.drain();
        let result = h.loot.host_handle(&mut h.world, "c1", put(id, 1, ItemTree::simple(5, 1)), "level_01", &mut h.outbox);
        assert_eq!(result, Err(DenyReason::NoInv));
    }

    #[test]
    fn test_take_split_and_slot_errors() {
        let mut h = host();
        h.world.add_item(h.box_entity, Some(2), ItemTree::simple(9, 10)).unwrap();

        let take_empty = LootRequest::Take(LootTakeRequest { container: h.box_id, token: 1, slot: 4 });
        assert_eq!(
            h.loot.host_handle(&mut h.world, "c1", take_empty, "level_01", &mut h.outbox),
            Err(DenyReason::BadSlot)
        );

        let whole = LootRequest::Split(LootSplitRequest {
            container: h.box_id,
            token: 2,
            slot: 2,
            count: 10,
            dest_slot: None,
        });
        assert_eq!(
            h.loot.host_handle(&mut h.world, "c1", whole, "level_01", &mut h.outbox),
            Err(DenyReason::SplitFail)
        );

        let split = LootRequest::Split(LootSplitRequest {
            container: h.box_id,
            token: 3,
            slot: 2,
            count: 4,
            dest_slot: Some(5),
        });
        h.loot
            .host_handle(&mut h.world, "c1", split, "level_01", &mut h.outbox)
            .unwrap();
        assert_eq!(h.world.item_at(h.box_entity, 2).unwrap().stack, 6);
        assert_eq!(h.world.item_at(h.box_entity, 5).unwrap().stack, 4);

        let take = LootRequest::Take(LootTakeRequest { container: h.box_id, token: 4, slot: 5 });
        h.loot
            .host_handle(&mut h.world, "c1", take, "level_01", &mut h.outbox)
            .unwrap();
        assert!(h.world.item_at(h.box_entity, 5).is_none());
    }

    #[test]
    fn test_plug_and_unplug() {
        let mut h = host();
        let rifle = ItemTree::simple(100, 1).with_slot("scope");
        h.world.add_item(h.box_entity, Some(0), rifle).unwrap();

        let bad_weapon = LootRequest::Plug(SlotPlugRequest {
            container: h.box_id,
            token: 1,
            weapon_slot: 3,
            slot_key: "scope".into(),
            source: ItemSource::Snapshot(ItemTree::simple(200, 1)),
        });
        assert_eq!(
            h.loot.host_handle(&mut h.world, "c1", bad_weapon, "level_01", &mut h.outbox),
            Err(DenyReason::BadWeapon)
        );

        let bad_slot = LootRequest::Plug(SlotPlugRequest {
            container: h.box_id,
            token: 2,
            weapon_slot: 0,
            slot_key: "barrel".into(),
            source: ItemSource::Snapshot(ItemTree::simple(200, 1)),
        });
        assert_eq!(
            h.loot.host_handle(&mut h.world, "c1", bad_slot, "level_01", &mut h.outbox),
            Err(DenyReason::BadSlot)
        );

        let bad_src = LootRequest::Plug(SlotPlugRequest {
            container: h.box_id,
            token: 3,
            weapon_slot: 0,
            slot_key: "scope".into(),
            source: ItemSource::Container { container: h.box_id.0, slot: 4 },
        });
        assert_eq!(
            h.loot.host_handle(&mut h.world, "c1", bad_src, "level_01", &mut h.outbox),
            Err(DenyReason::BadSrc)
        );

        let plug = LootRequest::Plug(SlotPlugRequest {
            container: h.box_id,
            token: 4,
            weapon_slot: 0,
            slot_key: "scope".into(),
            source: ItemSource::Snapshot(ItemTree::simple(200, 1)),
        });
        h.loot
            .host_handle(&mut h.world, "c1", plug, "level_01", &mut h.outbox)
            .unwrap();
        let rifle = h.world.item_at(h.box_entity, 0).unwrap();
        assert_eq!(rifle.slot("scope").unwrap().item.as_ref().map(|i| i.type_id), Some(200));

        let unplug = LootRequest::Unplug(SlotUnplugRequest {
            container: h.box_id,
            token: 5,
            weapon_slot: 0,
            slot_key: "scope".into(),
        });
        h.loot
            .host_handle(&mut h.world, "c1", unplug, "level_01", &mut h.outbox)
            .unwrap();
        let out = h.outbox.drain();
        assert!(out.iter().any(|o| matches!(
            &o.message,
            Message::SlotUnplugOk(ok) if ok.token == 5 && ok.item.type_id == 200
        )));

        let again = LootRequest::Unplug(SlotUnplugRequest {
            container: h.box_id,
            token: 6,
            weapon_slot: 0,
            slot_key: "scope".into(),
        });
        assert_eq!(
            h.loot.host_handle(&mut h.world, "c1", again, "level_01", &mut h.outbox),
            Err(DenyReason::UnplugFail)
        );
    }

    #[test]
    fn test_mute_window_flushes_once() {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let mut ids = NetIdAllocator::new();
        let mut outbox = Outbox::new();
        let c = world.place_container(Vec3::ZERO, 4, false);
        let id = loot
            .host_on_dead_lootbox_spawned(&world, c, NetId(8), Duration::ZERO, &mut ids, &mut outbox)
            .unwrap();
        assert_eq!(outbox.drain().len(), 2);
        assert!(loot.is_muted(id));

        world.add_item(c, None, ItemTree::simple(1, 1)).unwrap();
        world.add_item(c, None, ItemTree::simple(2, 1)).unwrap();
        loot.host_on_inventory_changed(&world, c, "level_01", &mut outbox);
        loot.host_on_inventory_changed(&world, c, "level_01", &mut outbox);
        assert!(outbox.is_empty());

        loot.host_tick(&world, 100 * MS, "level_01", &mut outbox);
        assert!(outbox.is_empty());
        loot.host_tick(&world, 300 * MS, "level_01", &mut outbox);
        let out = outbox.drain();
        assert_eq!(out.len(), 1);
        let Message::LootState(state) = &out[0].message else {
            panic!("expected state");
        };
        assert_eq!(state.items.len(), 2);

        // Unchanged content is not rebroadcast.
        loot.host_on_inventory_changed(&world, c, "level_01", &mut outbox);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_client_state_is_idempotent_and_deferred() {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let state = LootState {
            container: NetId(4),
            capacity: 3,
            items: vec![
                SlotItem { slot: 0, item: ItemTree::simple(1, 1) },
                SlotItem { slot: 2, item: ItemTree::simple(2, 5) },
            ],
        };
        assert_eq!(loot.on_state(&mut world, state.clone()), Deferral::Deferred);
        assert!(loot.has_pending_state(NetId(4)));

        let spawned = LootContainerSpawned {
            container: NetId(4),
            actor_id: NetId(1),
            scene_id: "Level_01".into(),
            position: Vec3::new(5.0, 0.0, 0.0).into(),
        };
        assert_eq!(loot.on_container_spawned(&mut world, spawned), None);
        let (ticket, entity) = world.poll_spawns()[0];
        assert_eq!(loot.on_spawned(&mut world, ticket, entity), SpawnResolution::Bound(NetId(4), entity));
        assert!(!loot.has_pending_state(NetId(4)));
        let first = world.items(entity);
        assert_eq!(first.len(), 2);

        assert_eq!(loot.on_state(&mut world, state.clone()), Deferral::Applied);
        assert_eq!(loot.on_state(&mut world, state), Deferral::Applied);
        assert_eq!(world.items(entity), first);
        assert_eq!(world.capacity(entity), Some(3));
    }

    #[test]
    fn test_spawned_container_matches_nearby() {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let local = world.place_container(Vec3::new(0.5, 0.0, 0.0), 4, false);
        let spawned = LootContainerSpawned {
            container: NetId(2),
            actor_id: NetId::INVALID,
            scene_id: "level_01".into(),
            position: Vec3::ZERO.into(),
        };
        assert_eq!(loot.on_container_spawned(&mut world, spawned), Some((NetId(2), local)));
        assert_eq!(world.pending_spawns(), 0);
    }

    #[test]
    fn test_client_deny_restores_item_and_resyncs() {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let mut outbox = Outbox::new();
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 4);
        world.add_item(player, Some(1), ItemTree::simple(5, 1)).unwrap();

        let token = loot
            .client_put_from_inventory(&mut world, NetId(99), 1, None, &mut outbox)
            .unwrap();
        assert_eq!(token, 1);
        assert!(world.items(player).is_empty());
        assert_eq!(loot.in_flight_op(token), Some(LootOp::Put));
        outbox.drain();

        let deny = LootDeny {
            token,
            container: NetId(99),
            reason: "no_inv".into(),
        };
        loot.on_deny(&mut world, &deny, &mut outbox);
        assert_eq!(world.items(player).len(), 1);
        assert_eq!(loot.in_flight(), 0);
        assert_eq!(
            outbox.drain()[0].message,
            Message::LootResyncRequest(LootResyncRequest { container: NetId(99) })
        );

        assert!(matches!(
            loot.client_put_from_inventory(&mut world, NetId(1), 3, None, &mut outbox),
            Err(SyncError::EmptySlot(3))
        ));
    }

    #[test]
    fn test_abandon_returns_removed_items() {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let mut outbox = Outbox::new();
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 4);
        world.add_item(player, Some(2), ItemTree::simple(5, 1)).unwrap();

        let put = loot
            .client_put_from_inventory(&mut world, NetId(7), 2, None, &mut outbox)
            .unwrap();
        let take = loot.client_take(NetId(7), 0, &mut outbox);
        assert!(world.items(player).is_empty());

        assert_eq!(loot.abandon_in_flight(&mut world), 2);
        assert_eq!(loot.in_flight(), 0);
        assert_eq!(world.items(player).len(), 1);
        // Late answers for abandoned tokens are ignored.
        assert!(!loot.on_ack(&mut world, put, None));
        assert!(!loot.on_ack(&mut world, take, Some(ItemTree::simple(8, 1))));
        assert_eq!(world.items(player).len(), 1);
    }

    #[test]
    fn test_ack_consumes_token_once() {
        let mut loot = LootSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let mut outbox = Outbox::new();
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 4);
        let token = loot.client_take(NetId(1), 0, &mut outbox);
        assert!(loot.on_ack(&mut world, token, Some(ItemTree::simple(8, 1))));
        assert!(!loot.on_ack(&mut world, token, Some(ItemTree::simple(8, 1))));
        assert_eq!(world.items(player).len(), 1);
    }

    #[test]
    fn test_tokens_skip_zero() {
        let mut loot = LootSync::new(&SyncConfig::default());
        loot.next_token = u32::MAX;
        assert_eq!(loot.allocate_token(), u32::MAX);
        assert_eq!(loot.allocate_token(), 1);
    }
}
