//! AI actor replication.
//!
//! The host registers every real AI actor under a [`NetId`], announces its
//! loadout and streams transforms and animation in budgeted batches. Clients
//! bind each id to a local actor: the nearest unbound actor within the rebind
//! radius, or a freshly spawned one when none is close enough.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use glam::Vec3;
use tandem_config::SyncConfig;
use tandem_net::messages::{
    AiAnimEntry, AiAnimations, AiAttack, AiLoadout, AiTransformBurst, AiTransformEntry,
    AiTransforms, NetId,
};

use crate::ids::{IdCategory, NetIdAllocator};
use crate::outbox::{Outbox, Target};
use crate::pending::PendingBuffer;
use crate::scene::same_map;
use crate::snapshot::plan_batches;
use crate::world::{
    ActorAccess, ActorInfo, AiAppearance, EntityRef, GameWorld, SpawnKind, SpawnRequest,
    SpawnResolution, SpawnTicket,
};

/// An update for an id this side does not know yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnknownUpdate {
    /// Transform entry.
    Transform(AiTransformEntry),
    /// Animation entry.
    Anim(AiAnimEntry),
}

/// AI id registry and replication state.
#[derive(Debug)]
pub struct AiSync {
    transform_interval: Duration,
    anim_interval: Duration,
    queue_capacity: usize,
    drain_per_tick: usize,
    rebind_radius: f32,
    rebind_cooldown: Duration,

    by_id: HashMap<NetId, EntityRef>,
    by_entity: HashMap<EntityRef, NetId>,

    // Host side.
    loadouts: HashMap<NetId, AiLoadout>,
    next_transform: Duration,
    next_anim: Duration,

    // Client side.
    pending_loadouts: PendingBuffer<NetId, AiLoadout>,
    spawning: HashMap<SpawnTicket, NetId>,
    unknown: VecDeque<UnknownUpdate>,
    cooldowns: HashMap<NetId, Duration>,
    ready: bool,
}

impl AiSync {
    /// Empty registry with intervals and limits from `config`.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            transform_interval: config.ai_transform_interval(),
            anim_interval: config.ai_anim_interval(),
            queue_capacity: config.unknown_actor_queue.max(1),
            drain_per_tick: config.unknown_actor_drain_per_tick.max(1),
            rebind_radius: config.rebind_radius,
            rebind_cooldown: config.rebind_cooldown(),
            by_id: HashMap::new(),
            by_entity: HashMap::new(),
            loadouts: HashMap::new(),
            next_transform: Duration::ZERO,
            next_anim: Duration::ZERO,
            pending_loadouts: PendingBuffer::new("ai-loadout"),
            spawning: HashMap::new(),
            unknown: VecDeque::new(),
            cooldowns: HashMap::new(),
            ready: false,
        }
    }

    /// Entity bound to an id.
    pub fn entity_of(&self, id: NetId) -> Option<EntityRef> {
        self.by_id.get(&id).copied()
    }

    /// Id bound to an entity.
    pub fn id_of(&self, entity: EntityRef) -> Option<NetId> {
        self.by_entity.get(&entity).copied()
    }

    /// Number of bound ids.
    pub fn registered(&self) -> usize {
        self.by_id.len()
    }

    /// Every binding, ordered by id.
    pub fn bound(&self) -> Vec<(NetId, EntityRef)> {
        let mut out: Vec<_> = self.by_id.iter().map(|(id, e)| (*id, *e)).collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Whether the first transform burst has arrived (client side).
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Updates parked for unknown ids.
    pub fn queued(&self) -> usize {
        self.unknown.len()
    }

    /// Whether a loadout waits for its spawn.
    pub fn has_pending_loadout(&self, id: NetId) -> bool {
        self.pending_loadouts.contains(&id)
    }

    fn bind(&mut self, id: NetId, entity: EntityRef) {
        self.by_id.insert(id, entity);
        self.by_entity.insert(entity, id);
        self.cooldowns.remove(&id);
    }

    fn unbind(&mut self, id: NetId) -> Option<EntityRef> {
        let entity = self.by_id.remove(&id)?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    /// Forget everything, as on a scene change. Returns the bindings dropped.
    ///
    /// Host ids are released back to `ids`.
    pub fn reset(&mut self, ids: Option<&mut NetIdAllocator>) -> Vec<(NetId, EntityRef)> {
        let dropped: Vec<_> = self.by_id.drain().collect();
        self.by_entity.clear();
        if let Some(ids) = ids {
            for _ in &dropped {
                ids.release(IdCategory::AiActor);
            }
        }
        self.loadouts.clear();
        self.pending_loadouts.clear();
        self.spawning.clear();
        self.unknown.clear();
        self.cooldowns.clear();
        self.ready = false;
        dropped
    }

    fn eligible(&self, world: &impl ActorAccess) -> Vec<(NetId, ActorInfo)> {
        let mut out: Vec<_> = self
            .by_id
            .iter()
            .filter_map(|(id, entity)| {
                let info = world.actor(*entity)?;
                let real = info.enabled
                    && !info.is_player
                    && !info.is_replica
                    && world.is_real_actor(*entity);
                real.then_some((*id, info))
            })
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    // -----------------------------------------------------------------------
    // Host
    // -----------------------------------------------------------------------

    /// Register a freshly spawned actor. Returns the loadout to announce.
    pub fn host_register(
        &mut self,
        world: &impl ActorAccess,
        entity: EntityRef,
        scene_id: &str,
        ids: &mut NetIdAllocator,
    ) -> Option<AiLoadout> {
        if self.by_entity.contains_key(&entity) || !world.is_real_actor(entity) {
            return None;
        }
        let info = world.actor(entity)?;
        let appearance = world.appearance(entity).unwrap_or_default();
        let id = ids.allocate(IdCategory::AiActor);
        self.bind(id, entity);
        let loadout = AiLoadout {
            id,
            scene_id: scene_id.to_string(),
            position: info.position.into(),
            facing: info.facing.into(),
            model_key: appearance.model_key,
            weapons: appearance.weapons,
            face: appearance.face,
        };
        tracing::info!("Registered AI {id} ({})", loadout.model_key);
        self.loadouts.insert(id, loadout.clone());
        Some(loadout)
    }

    /// Unregister a destroyed actor, releasing its id.
    pub fn host_unregister(&mut self, entity: EntityRef, ids: &mut NetIdAllocator) -> Option<NetId> {
        let id = self.by_entity.get(&entity).copied()?;
        self.unbind(id);
        self.loadouts.remove(&id);
        ids.release(IdCategory::AiActor);
        Some(id)
    }

    /// Stream transforms and animation when their intervals elapse.
    pub fn host_tick(
        &mut self,
        world: &impl ActorAccess,
        now: Duration,
        budget: usize,
        scene_id: &str,
        outbox: &mut Outbox,
    ) {
        let transforms_due = now >= self.next_transform;
        let anims_due = now >= self.next_anim;
        if !transforms_due && !anims_due {
            return;
        }
        let eligible = self.eligible(world);
        let target = || Target::InScene {
            scene_id: scene_id.to_string(),
            except: None,
        };

        if transforms_due {
            self.next_transform = now + self.transform_interval;
            let entries = eligible
                .iter()
                .map(|(id, info)| transform_entry(*id, info))
                .collect();
            for batch in plan_batches(entries, budget).batches {
                outbox.push(target(), AiTransforms { entries: batch });
            }
        }
        if anims_due {
            self.next_anim = now + self.anim_interval;
            let entries = eligible
                .iter()
                .map(|(id, info)| AiAnimEntry {
                    id: *id,
                    anim: info.anim,
                })
                .collect();
            for batch in plan_batches(entries, budget).batches {
                outbox.push(target(), AiAnimations { entries: batch });
            }
        }
    }

    /// Reply to a snapshot request: every loadout, then a transform burst.
    ///
    /// The burst is sent even when empty; it marks the requester ready.
    pub fn host_snapshot(
        &self,
        world: &impl ActorAccess,
        requester: &str,
        budget: usize,
        outbox: &mut Outbox,
    ) {
        let to = || Target::Endpoint(requester.to_string());
        let eligible = self.eligible(world);
        for (id, info) in &eligible {
            if let Some(loadout) = self.loadouts.get(id) {
                let mut loadout = loadout.clone();
                loadout.position = info.position.into();
                loadout.facing = info.facing.into();
                outbox.push(to(), loadout);
            }
        }
        let entries = eligible
            .iter()
            .map(|(id, info)| transform_entry(*id, info))
            .collect();
        let plan = plan_batches(entries, budget);
        if plan.batches.is_empty() {
            outbox.push(to(), AiTransformBurst { entries: Vec::new() });
        }
        for batch in plan.batches {
            outbox.push(to(), AiTransformBurst { entries: batch });
        }
    }

    /// Replicate an attack swing of a registered actor.
    pub fn host_attack(&self, entity: EntityRef, weapon_slot: u8, scene_id: &str, outbox: &mut Outbox) {
        if let Some(id) = self.id_of(entity) {
            outbox.push(
                Target::InScene {
                    scene_id: scene_id.to_string(),
                    except: None,
                },
                AiAttack { id, weapon_slot },
            );
        }
    }

    // -----------------------------------------------------------------------
    // Client
    // -----------------------------------------------------------------------

    fn nearest_unbound(&self, world: &impl ActorAccess, position: Vec3) -> Option<EntityRef> {
        world
            .actors()
            .into_iter()
            .filter(|a| {
                a.enabled
                    && !a.is_player
                    && !a.is_replica
                    && !self.by_entity.contains_key(&a.entity)
                    && world.is_real_actor(a.entity)
            })
            .map(|a| (a.position.distance(position), a.entity))
            .filter(|(d, _)| *d <= self.rebind_radius)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, e)| e)
    }

    /// A host actor was announced. Returns the binding if one was made now.
    pub fn on_loadout<W: GameWorld>(
        &mut self,
        world: &mut W,
        loadout: AiLoadout,
    ) -> Option<(NetId, EntityRef)> {
        let scene = world.current_scene_id();
        if !same_map(&loadout.scene_id, &scene) {
            tracing::debug!("Ignoring loadout {} for scene {}", loadout.id, loadout.scene_id);
            return None;
        }
        let id = loadout.id;
        let position = loadout.position.to_vec3();
        let facing = loadout.facing.to_dir();
        let appearance = appearance_of(&loadout);

        if let Some(entity) = self.entity_of(id) {
            if world.is_alive(entity) {
                world.apply_loadout(entity, &appearance);
                world.set_transform(entity, position, facing);
                return None;
            }
            self.unbind(id);
        }

        if let Some(entity) = self.nearest_unbound(&*world, position) {
            self.bind(id, entity);
            world.apply_loadout(entity, &appearance);
            world.set_transform(entity, position, facing);
            tracing::info!("Bound AI {id} to nearby actor {entity}");
            return Some((id, entity));
        }

        let in_flight = self.pending_loadouts.contains(&id);
        self.pending_loadouts.defer(id, loadout);
        if !in_flight {
            let ticket = world.request_spawn(SpawnRequest {
                kind: SpawnKind::AiActor { appearance },
                scene_id: scene,
                position,
                facing,
            });
            self.spawning.insert(ticket, id);
            tracing::debug!("Spawning actor for AI {id}");
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
        let loadout = match self.pending_loadouts.take(&id) {
            Some(loadout) if !self.by_id.contains_key(&id) => loadout,
            _ => {
                tracing::debug!("Discarding stale spawn for AI {id}");
                world.destroy(entity);
                return SpawnResolution::Discarded;
            }
        };
        self.bind(id, entity);
        world.apply_loadout(entity, &appearance_of(&loadout));
        world.set_transform(entity, loadout.position.to_vec3(), loadout.facing.to_dir());
        tracing::info!("Spawned actor {entity} for AI {id}");
        SpawnResolution::Bound(id, entity)
    }

    fn enqueue(&mut self, update: UnknownUpdate) {
        self.unknown.push_back(update);
        while self.unknown.len() > self.queue_capacity {
            self.unknown.pop_front();
            tracing::trace!("Unknown AI queue full, dropped oldest");
        }
    }

    fn apply_transform<W: GameWorld>(
        &mut self,
        world: &mut W,
        entry: AiTransformEntry,
        now: Duration,
    ) -> Option<(NetId, EntityRef)> {
        let position = entry.position.to_vec3();
        let facing = entry.facing.to_dir();
        if let Some(entity) = self.entity_of(entry.id) {
            world.set_transform(entity, position, facing);
            return None;
        }
        if !self.ready {
            self.enqueue(UnknownUpdate::Transform(entry));
            return None;
        }
        if self.pending_loadouts.contains(&entry.id) {
            return None;
        }
        if self.cooldowns.get(&entry.id).is_some_and(|until| now < *until) {
            return None;
        }
        match self.nearest_unbound(&*world, position) {
            Some(entity) => {
                self.bind(entry.id, entity);
                world.set_transform(entity, position, facing);
                tracing::info!("Rebound AI {} to actor {entity}", entry.id);
                Some((entry.id, entity))
            }
            None => {
                tracing::trace!("No actor near AI {}, cooling down", entry.id);
                self.cooldowns.insert(entry.id, now + self.rebind_cooldown);
                None
            }
        }
    }

    fn apply_anim<W: GameWorld>(&mut self, world: &mut W, entry: AiAnimEntry) {
        match self.entity_of(entry.id) {
            Some(entity) => world.set_animation(entity, entry.anim),
            None if !self.ready => self.enqueue(UnknownUpdate::Anim(entry)),
            None => {}
        }
    }

    /// Periodic transform batch. Returns bindings made by auto-rebinding.
    pub fn on_transforms<W: GameWorld>(
        &mut self,
        world: &mut W,
        entries: Vec<AiTransformEntry>,
        now: Duration,
    ) -> Vec<(NetId, EntityRef)> {
        entries
            .into_iter()
            .filter_map(|entry| self.apply_transform(world, entry, now))
            .collect()
    }

    /// Periodic animation batch.
    pub fn on_animations<W: GameWorld>(&mut self, world: &mut W, entries: Vec<AiAnimEntry>) {
        for entry in entries {
            self.apply_anim(world, entry);
        }
    }

    /// Scene-entry burst. Marks the subsystem ready.
    pub fn on_burst<W: GameWorld>(
        &mut self,
        world: &mut W,
        entries: Vec<AiTransformEntry>,
        now: Duration,
    ) -> Vec<(NetId, EntityRef)> {
        if !self.ready {
            tracing::debug!("AI replication ready, {} updates queued", self.unknown.len());
        }
        self.ready = true;
        self.on_transforms(world, entries, now)
    }

    /// Drain queued updates at a bounded rate once ready.
    pub fn client_tick<W: GameWorld>(&mut self, world: &mut W, now: Duration) -> Vec<(NetId, EntityRef)> {
        self.cooldowns.retain(|_, until| now < *until);
        if !self.ready {
            return Vec::new();
        }
        let mut bound = Vec::new();
        for _ in 0..self.drain_per_tick {
            let Some(update) = self.unknown.pop_front() else {
                break;
            };
            match update {
                UnknownUpdate::Transform(entry) => {
                    bound.extend(self.apply_transform(world, entry, now));
                }
                UnknownUpdate::Anim(entry) => self.apply_anim(world, entry),
            }
        }
        bound
    }

    /// The host despawned an id. Returns the destroyed entity.
    pub fn on_despawn<W: GameWorld>(&mut self, world: &mut W, id: NetId) -> Option<EntityRef> {
        self.pending_loadouts.take(&id);
        let entity = self.unbind(id)?;
        world.destroy(entity);
        Some(entity)
    }

    /// Replay an attack swing.
    pub fn on_attack<W: GameWorld>(&mut self, world: &mut W, id: NetId, weapon_slot: u8) {
        if let Some(entity) = self.entity_of(id) {
            world.play_attack(entity, weapon_slot);
        }
    }
}

fn transform_entry(id: NetId, info: &ActorInfo) -> AiTransformEntry {
    AiTransformEntry {
        id,
        position: info.position.into(),
        facing: info.facing.into(),
    }
}

fn appearance_of(loadout: &AiLoadout) -> AiAppearance {
    AiAppearance {
        model_key: loadout.model_key.clone(),
        weapons: loadout.weapons.clone(),
        face: loadout.face.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use crate::world::{EntityFactory, Health};
    use tandem_net::messages::Message;

    const MS: Duration = Duration::from_millis(1);

    fn appearance(key: &str) -> AiAppearance {
        AiAppearance {
            model_key: key.to_string(),
            weapons: vec![7],
            face: vec![1, 2],
        }
    }

    fn loadout(id: u32, at: Vec3) -> AiLoadout {
        AiLoadout {
            id: NetId(id),
            scene_id: "level_01".into(),
            position: at.into(),
            facing: Vec3::X.into(),
            model_key: "grunt".into(),
            weapons: vec![3],
            face: vec![],
        }
    }

    fn entry(id: u32, at: Vec3) -> AiTransformEntry {
        AiTransformEntry {
            id: NetId(id),
            position: at.into(),
            facing: Vec3::Z.into(),
        }
    }

    #[test]
    fn test_host_registers_real_actors_only() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut ids = NetIdAllocator::new();
        let mut world = MemoryWorld::new("level_01");
        let grunt = world.place_ai(appearance("grunt"), Vec3::ONE, Health::new(40.0, 40.0));
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 4);

        let l = ai.host_register(&world, grunt, "level_01", &mut ids).unwrap();
        assert_eq!(l.id, NetId(1));
        assert_eq!(l.model_key, "grunt");
        assert!(ai.host_register(&world, grunt, "level_01", &mut ids).is_none());
        assert!(ai.host_register(&world, player, "level_01", &mut ids).is_none());

        assert_eq!(ai.host_unregister(grunt, &mut ids), Some(NetId(1)));
        assert_eq!(ids.live(IdCategory::AiActor), 0);
    }

    #[test]
    fn test_host_tick_batches_within_budget() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut ids = NetIdAllocator::new();
        let mut world = MemoryWorld::new("level_01");
        let mut outbox = Outbox::new();

        // Nothing registered: no packets.
        ai.host_tick(&world, Duration::ZERO, 1200, "level_01", &mut outbox);
        assert!(outbox.is_empty());

        for i in 0..40 {
            let e = world.place_ai(appearance("grunt"), Vec3::splat(i as f32), Health::new(1.0, 1.0));
            ai.host_register(&world, e, "level_01", &mut ids);
        }
        ai.host_tick(&world, 100 * MS, 120, "level_01", &mut outbox);
        let out = outbox.drain();
        let transforms: usize = out
            .iter()
            .filter_map(|o| match &o.message {
                Message::AiTransforms(t) => Some(t.entries.len()),
                _ => None,
            })
            .sum();
        assert_eq!(transforms, 40);
        assert!(out.iter().any(|o| matches!(o.message, Message::AiAnimations(_))));
        assert!(out.iter().all(|o| matches!(o.target, Target::InScene { .. })));
        assert!(out.len() > 2);

        // Interval not elapsed.
        ai.host_tick(&world, 150 * MS, 120, "level_01", &mut outbox);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_snapshot_always_ends_with_burst() {
        let ai = AiSync::new(&SyncConfig::default());
        let world = MemoryWorld::new("level_01");
        let mut outbox = Outbox::new();
        ai.host_snapshot(&world, "c1", 65536, &mut outbox);
        let out = outbox.drain();
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].message,
            Message::AiTransformBurst(AiTransformBurst { entries: vec![] })
        );
        assert_eq!(out[0].target, Target::Endpoint("c1".into()));
    }

    #[test]
    fn test_loadout_binds_nearest_actor_in_radius() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let near = world.place_ai(appearance("a"), Vec3::new(1.0, 0.0, 0.0), Health::new(1.0, 1.0));
        let _far = world.place_ai(appearance("b"), Vec3::new(2.5, 0.0, 0.0), Health::new(1.0, 1.0));

        let bound = ai.on_loadout(&mut world, loadout(5, Vec3::ZERO));
        assert_eq!(bound, Some((NetId(5), near)));
        assert_eq!(world.appearance(near).unwrap().model_key, "grunt");
        assert_eq!(world.pending_spawns(), 0);
    }

    #[test]
    fn test_loadout_spawns_when_nothing_near() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        assert_eq!(ai.on_loadout(&mut world, loadout(5, Vec3::ZERO)), None);
        // A second loadout while in flight does not spawn twice.
        assert_eq!(ai.on_loadout(&mut world, loadout(5, Vec3::X)), None);
        assert_eq!(world.pending_spawns(), 1);
        assert!(ai.has_pending_loadout(NetId(5)));

        let (ticket, entity) = world.poll_spawns()[0];
        assert_eq!(ai.on_spawned(&mut world, ticket, entity), SpawnResolution::Bound(NetId(5), entity));
        assert_eq!(ai.entity_of(NetId(5)), Some(entity));
        assert!(!ai.has_pending_loadout(NetId(5)));
        assert_eq!(world.actor(entity).unwrap().position, Vec3::X);
    }

    #[test]
    fn test_spawn_after_despawn_is_discarded() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        ai.on_loadout(&mut world, loadout(5, Vec3::ZERO));
        ai.on_despawn(&mut world, NetId(5));
        let (ticket, entity) = world.poll_spawns()[0];
        assert_eq!(ai.on_spawned(&mut world, ticket, entity), SpawnResolution::Discarded);
        assert!(!world.is_alive(entity));
    }

    #[test]
    fn test_loadout_for_other_scene_is_ignored() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("base");
        assert_eq!(ai.on_loadout(&mut world, loadout(5, Vec3::ZERO)), None);
        assert_eq!(world.pending_spawns(), 0);
    }

    #[test]
    fn test_unknown_updates_queue_until_ready() {
        let config = SyncConfig {
            unknown_actor_queue: 3,
            unknown_actor_drain_per_tick: 2,
            ..SyncConfig::default()
        };
        let mut ai = AiSync::new(&config);
        let mut world = MemoryWorld::new("level_01");
        let actors: Vec<_> = (0..5)
            .map(|i| world.place_ai(appearance("a"), Vec3::new(i as f32 * 10.0, 0.0, 0.0), Health::new(1.0, 1.0)))
            .collect();

        let entries = (0..5).map(|i| entry(i + 1, Vec3::new(i as f32 * 10.0, 0.0, 0.0))).collect();
        assert!(ai.on_transforms(&mut world, entries, Duration::ZERO).is_empty());
        // Oldest two dropped.
        assert_eq!(ai.queued(), 3);
        assert!(ai.client_tick(&mut world, Duration::ZERO).is_empty());

        ai.on_burst(&mut world, Vec::new(), Duration::ZERO);
        let first = ai.client_tick(&mut world, Duration::ZERO);
        assert_eq!(first.len(), 2);
        let second = ai.client_tick(&mut world, Duration::ZERO);
        assert_eq!(second, vec![(NetId(5), actors[4])]);
        assert_eq!(ai.queued(), 0);
    }

    #[test]
    fn test_failed_rebind_cools_down() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        ai.on_burst(&mut world, Vec::new(), Duration::ZERO);

        assert!(ai.on_transforms(&mut world, vec![entry(9, Vec3::ZERO)], Duration::ZERO).is_empty());
        let actor = world.place_ai(appearance("a"), Vec3::ZERO, Health::new(1.0, 1.0));
        assert!(ai.on_transforms(&mut world, vec![entry(9, Vec3::ZERO)], 500 * MS).is_empty());
        assert_eq!(
            ai.on_transforms(&mut world, vec![entry(9, Vec3::ZERO)], 1000 * MS),
            vec![(NetId(9), actor)]
        );
    }

    #[test]
    fn test_expired_cooldowns_are_pruned() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        ai.on_burst(&mut world, Vec::new(), Duration::ZERO);

        let strays = (10..20).map(|i| entry(i, Vec3::new(i as f32 * 50.0, 0.0, 0.0))).collect();
        ai.on_transforms(&mut world, strays, Duration::ZERO);
        assert_eq!(ai.cooldowns.len(), 10);

        ai.client_tick(&mut world, 500 * MS);
        assert_eq!(ai.cooldowns.len(), 10);
        ai.client_tick(&mut world, 1000 * MS);
        assert!(ai.cooldowns.is_empty());
    }

    #[test]
    fn test_reset_clears_readiness() {
        let mut ai = AiSync::new(&SyncConfig::default());
        let mut world = MemoryWorld::new("level_01");
        let actor = world.place_ai(appearance("a"), Vec3::ZERO, Health::new(1.0, 1.0));
        ai.on_loadout(&mut world, loadout(1, Vec3::ZERO));
        ai.on_burst(&mut world, Vec::new(), Duration::ZERO);
        assert_eq!(ai.reset(None), vec![(NetId(1), actor)]);
        assert!(!ai.is_ready());
        assert_eq!(ai.registered(), 0);
    }
}
