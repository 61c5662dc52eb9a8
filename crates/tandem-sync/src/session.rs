//! Session state and the per-tick phases that do not belong to one message.
//!
//! A [`Session`] owns the [`SessionContext`] handed in by the embedder plus
//! every replication subsystem. Message handlers (see `handlers`) and the
//! tick phases below mutate it; nothing else does.

use std::collections::VecDeque;
use std::time::Duration;

use glam::Vec3;
use tandem_config::SyncConfig;
use tandem_net::messages::{
    AiDamage, AiDespawn, AiSnapshotRequest, BuffTarget, ClientHello, ClientStatus, NetId,
    PROTOCOL_VERSION, Ping, PlayerAnim, PlayerLeft, PlayerList, PlayerPosition, PlayerStatus,
    RemoteHealth,
};
use tandem_net::routing::Role;
use tandem_net::transport::{Delivery, PeerHandle, Transport, TransportEvent};

use crate::ai::AiSync;
use crate::buff::BuffSync;
use crate::clock::{Clock, SystemClock};
use crate::health::{HealthKey, HealthOwner, HealthSync};
use crate::ids::NetIdAllocator;
use crate::loot::LootSync;
use crate::outbox::{FlushStats, Outbox, Target};
use crate::players::PlayerRegistry;
use crate::world::{EntityRef, GameWorld, SpawnKind, SpawnRequest, SpawnResolution, WorldEvent};

/// Pings remembered for matching pongs.
const PING_HISTORY: usize = 8;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Who this participant is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    /// Stable endpoint id.
    pub endpoint_id: String,
    /// Name shown to others.
    pub display_name: String,
}

/// Everything a session needs from its embedder.
pub struct SessionContext<W> {
    /// Host or client, fixed for the session.
    pub role: Role,
    /// Sync tuning.
    pub config: SyncConfig,
    /// Time source for every window and interval.
    pub clock: Box<dyn Clock>,
    /// Network backend.
    pub transport: Box<dyn Transport>,
    /// Game simulation.
    pub world: W,
    /// Local participant.
    pub local: LocalIdentity,
}

impl<W> SessionContext<W> {
    /// Context using the wall clock.
    pub fn new(
        role: Role,
        config: SyncConfig,
        transport: Box<dyn Transport>,
        world: W,
        local: LocalIdentity,
    ) -> Self {
        Self {
            role,
            config,
            clock: Box::new(SystemClock::new()),
            transport,
            world,
            local,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Intervals {
    status: Duration,
    position: Duration,
    ping: Duration,
    discovery: Duration,
}

fn due(next: &mut Duration, now: Duration, every: Duration) -> bool {
    if now < *next {
        return false;
    }
    *next = now + every;
    true
}

/// Live session state.
pub struct Session<W> {
    pub(crate) ctx: SessionContext<W>,
    pub(crate) players: PlayerRegistry,
    pub(crate) health: HealthSync,
    pub(crate) ai: AiSync,
    pub(crate) loot: LootSync,
    pub(crate) buffs: BuffSync,
    pub(crate) ids: NetIdAllocator,
    pub(crate) outbox: Outbox,
    /// Client: transport handle and endpoint id of the host.
    pub(crate) host_peer: Option<PeerHandle>,
    pub(crate) host_endpoint: Option<String>,
    /// Client: the host accepted our hello.
    pub(crate) welcomed: bool,
    ping_seq: u32,
    pings: VecDeque<(u32, Duration)>,
    intervals: Intervals,
}

impl<W: GameWorld> Session<W> {
    pub(crate) fn new(ctx: SessionContext<W>) -> Self {
        let config = ctx.config.clone();
        Self {
            players: PlayerRegistry::new(),
            health: HealthSync::new(&config),
            ai: AiSync::new(&config),
            loot: LootSync::new(&config),
            buffs: BuffSync::new(),
            ids: NetIdAllocator::new(),
            outbox: Outbox::new(),
            host_peer: None,
            host_endpoint: None,
            welcomed: false,
            ping_seq: 0,
            pings: VecDeque::new(),
            intervals: Intervals::default(),
            ctx,
        }
    }

    pub(crate) fn now(&self) -> Duration {
        self.ctx.clock.now()
    }

    pub(crate) fn is_host(&self) -> bool {
        self.ctx.role == Role::Host
    }

    pub(crate) fn scene(&self) -> String {
        self.ctx.world.current_scene_id()
    }

    /// Single-packet budget for a delivery class.
    pub(crate) fn budget(&self, delivery: Delivery) -> usize {
        self.ctx
            .transport
            .max_packet_size(delivery)
            .filter(|&n| n > 0)
            .unwrap_or(self.ctx.config.fallback_packet_budget as usize)
    }

    /// Status describing the local participant.
    pub(crate) fn local_status(&self) -> PlayerStatus {
        let world = &self.ctx.world;
        let appearance = world.local_appearance();
        let (position, facing) = world
            .local_player()
            .and_then(|p| world.actor(p))
            .map(|a| (a.position, a.facing))
            .unwrap_or((Vec3::ZERO, Vec3::Z));
        PlayerStatus {
            endpoint_id: self.ctx.local.endpoint_id.clone(),
            display_name: self.ctx.local.display_name.clone(),
            position: position.into(),
            facing: facing.into(),
            in_game: world.in_game(),
            scene_id: world.current_scene_id(),
            cosmetic: appearance.cosmetic,
            equipment: appearance.equipment,
            weapons: appearance.weapons,
            latency_ms: 0,
        }
    }

    /// Every participant's status, the local one included.
    pub(crate) fn all_statuses(&self) -> Vec<PlayerStatus> {
        let mut statuses = self.players.statuses();
        statuses.push(self.local_status());
        statuses
    }

    /// Entity standing for a buff target on this side.
    pub(crate) fn buff_entity(&self, target: &BuffTarget) -> Option<EntityRef> {
        match target {
            BuffTarget::Player(endpoint) if *endpoint == self.ctx.local.endpoint_id => {
                self.ctx.world.local_player()
            }
            BuffTarget::Player(endpoint) => self.players.replica_of(endpoint),
            BuffTarget::Ai(id) => self.ai.entity_of(*id),
        }
    }

    // -----------------------------------------------------------------------
    // Players and replicas
    // -----------------------------------------------------------------------

    /// Spawn and despawn replicas to match scene affinity.
    pub(crate) fn refresh_interest(&mut self) {
        let scene = self.scene();
        let in_game = self.ctx.world.in_game();
        let transitions = self.players.evaluate_interest(&scene, in_game);
        for endpoint in transitions.despawn {
            tracing::debug!("{endpoint} left our scene, despawning replica");
            self.despawn_replica(&endpoint);
        }
        for endpoint in transitions.spawn {
            let Some(entry) = self.players.get(&endpoint) else {
                continue;
            };
            let request = SpawnRequest {
                kind: SpawnKind::PlayerReplica {
                    endpoint_id: endpoint.clone(),
                    display_name: entry.status.display_name.clone(),
                },
                scene_id: scene.clone(),
                position: entry.status.position.to_vec3(),
                facing: entry.status.facing.to_dir(),
            };
            let ticket = self.ctx.world.request_spawn(request);
            self.players.set_spawning(&endpoint, ticket);
            tracing::debug!("Spawning replica for {endpoint}");
        }
    }

    fn despawn_replica(&mut self, endpoint: &str) {
        if let Some(entity) = self.players.take_replica(endpoint) {
            self.health.release(&mut self.ctx.world, entity);
            self.ctx.world.destroy(entity);
        }
    }

    /// Forget a participant and everything owned on its behalf.
    pub(crate) fn remove_player(&mut self, endpoint: &str) {
        self.despawn_replica(endpoint);
        self.health
            .drop_pending(&HealthKey::Player(endpoint.to_string()));
        self.buffs
            .drop_target(&BuffTarget::Player(endpoint.to_string()));
        self.players.remove(endpoint);
    }

    fn on_replica_spawned(&mut self, endpoint: &str, entity: EntityRef, now: Duration) {
        let scene = self.scene();
        if !self
            .players
            .shares_scene(endpoint, &scene, self.ctx.world.in_game())
        {
            tracing::debug!("{endpoint} no longer shares our scene, discarding {entity}");
            self.players.take_replica(endpoint);
            self.ctx.world.destroy(entity);
            return;
        }
        self.players.set_live(endpoint, entity);
        match self.ctx.role {
            Role::Host => {
                self.health.bind_authority(
                    &mut self.ctx.world,
                    entity,
                    HealthOwner::Remote(endpoint.to_string()),
                    now,
                    &mut self.outbox,
                );
            }
            Role::Client => {
                self.health.bind_mirror(
                    &mut self.ctx.world,
                    entity,
                    HealthKey::Player(endpoint.to_string()),
                    now,
                );
            }
        }
        self.buffs.flush(
            &mut self.ctx.world,
            &BuffTarget::Player(endpoint.to_string()),
            entity,
            now,
        );
        tracing::info!("Replica of {endpoint} is {entity}");
    }

    /// Host: tell a newcomer every health value it cannot know yet.
    pub(crate) fn send_health_catchup(&mut self, endpoint: &str) {
        let to = Target::Endpoint(endpoint.to_string());
        if let Some(player) = self.ctx.world.local_player()
            && let Some(h) = self.ctx.world.health(player)
        {
            self.outbox.push(
                to.clone(),
                RemoteHealth {
                    endpoint_id: self.ctx.local.endpoint_id.clone(),
                    max: h.max,
                    current: h.current,
                },
            );
        }
        for other in self.players.endpoints() {
            if other == endpoint {
                continue;
            }
            if let Some(replica) = self.players.replica_of(&other)
                && let Some(h) = self.ctx.world.health(replica)
            {
                self.outbox.push(
                    to.clone(),
                    RemoteHealth {
                        endpoint_id: other,
                        max: h.max,
                        current: h.current,
                    },
                );
            }
        }
    }

    /// Client: the host went away. Drop everything the session mirrored.
    pub(crate) fn teardown(&mut self) {
        for (_, entry) in self.players.clear() {
            if let Some(entity) = entry.replica_entity() {
                self.health.unbind(&mut self.ctx.world, entity);
                self.ctx.world.destroy(entity);
            }
        }
        self.ai.reset(None);
        self.loot.reset(None);
        let abandoned = self.loot.abandon_in_flight(&mut self.ctx.world);
        if abandoned > 0 {
            tracing::info!("Dropped {abandoned} unanswered loot requests");
        }
        self.health.unbind_all(&mut self.ctx.world);
        self.host_peer = None;
        self.host_endpoint = None;
        self.welcomed = false;
    }

    // -----------------------------------------------------------------------
    // AI registration
    // -----------------------------------------------------------------------

    /// Host: register an actor and announce it to the scene.
    pub(crate) fn host_register_actor(&mut self, entity: EntityRef, now: Duration) {
        let scene = self.scene();
        let Some(loadout) = self
            .ai
            .host_register(&self.ctx.world, entity, &scene, &mut self.ids)
        else {
            return;
        };
        let id = loadout.id;
        self.outbox.push(
            Target::InScene {
                scene_id: scene,
                except: None,
            },
            loadout,
        );
        self.health.bind_authority(
            &mut self.ctx.world,
            entity,
            HealthOwner::Ai(id),
            now,
            &mut self.outbox,
        );
        tracing::info!("Registered AI {id} as {entity}");
    }

    /// Host: register every real actor already in the scene.
    pub(crate) fn register_scene_actors(&mut self, now: Duration) {
        let actors: Vec<_> = self
            .ctx
            .world
            .actors()
            .into_iter()
            .filter(|a| !a.is_player && !a.is_replica)
            .map(|a| a.entity)
            .collect();
        for entity in actors {
            self.host_register_actor(entity, now);
        }
    }

    /// Client: an AI id was bound to a local actor.
    pub(crate) fn bind_ai_mirror(&mut self, id: NetId, entity: EntityRef, now: Duration) {
        self.health
            .bind_mirror(&mut self.ctx.world, entity, HealthKey::Ai(id), now);
        self.buffs
            .flush(&mut self.ctx.world, &BuffTarget::Ai(id), entity, now);
    }

    pub(crate) fn bind_ai_mirrors(&mut self, bindings: Vec<(NetId, EntityRef)>, now: Duration) {
        for (id, entity) in bindings {
            self.bind_ai_mirror(id, entity, now);
        }
    }

    fn on_scene_changed(&mut self, scene_id: &str, now: Duration) {
        tracing::info!("Scene changed to '{scene_id}'");
        let ids = self.is_host().then_some(&mut self.ids);
        for (_, entity) in self.ai.reset(ids) {
            self.health.unbind(&mut self.ctx.world, entity);
        }
        let ids = self.is_host().then_some(&mut self.ids);
        self.loot.reset(ids);
        self.health.drop_pending_ai();
        self.buffs.drop_ai();
        for endpoint in self.players.endpoints() {
            self.despawn_replica(&endpoint);
        }

        match self.ctx.role {
            Role::Host => {
                self.register_scene_actors(now);
                self.outbox.push(
                    Target::Broadcast { except: None },
                    PlayerList {
                        statuses: self.all_statuses(),
                    },
                );
            }
            Role::Client if self.welcomed => {
                self.outbox.push(
                    Target::Host,
                    ClientStatus {
                        status: self.local_status(),
                    },
                );
                if self.ctx.world.in_game() {
                    self.outbox.push(
                        Target::Host,
                        AiSnapshotRequest {
                            scene_id: scene_id.to_string(),
                        },
                    );
                }
            }
            Role::Client => {}
        }
        self.refresh_interest();
    }

    // -----------------------------------------------------------------------
    // Tick phases
    // -----------------------------------------------------------------------

    /// Bind (host) or track (client) the local player's health once it exists.
    pub(crate) fn ensure_local_health(&mut self, now: Duration) {
        let Some(player) = self.ctx.world.local_player() else {
            return;
        };
        match self.ctx.role {
            Role::Host if !self.health.is_bound(player) => {
                self.health.bind_authority(
                    &mut self.ctx.world,
                    player,
                    HealthOwner::Local(self.ctx.local.endpoint_id.clone()),
                    now,
                    &mut self.outbox,
                );
            }
            Role::Client if self.health.local_entity() != Some(player) => {
                self.health.track_local(&mut self.ctx.world, player);
            }
            _ => {}
        }
    }

    /// Feed simulation events to the subsystems.
    pub(crate) fn process_events(&mut self, now: Duration) {
        for event in self.ctx.world.drain_events() {
            match self.ctx.role {
                Role::Host => self.host_event(event, now),
                Role::Client => self.client_event(event, now),
            }
        }
    }

    fn host_event(&mut self, event: WorldEvent, now: Duration) {
        match event {
            WorldEvent::HealthChanged { entity, health } => {
                self.health.on_changed(entity, health, now, &mut self.outbox);
            }
            WorldEvent::ActorSpawned { entity } => self.host_register_actor(entity, now),
            WorldEvent::ActorDestroyed { entity } => {
                let scene = self.scene();
                if let Some(id) = self.ai.host_unregister(entity, &mut self.ids) {
                    self.outbox.push(
                        Target::InScene {
                            scene_id: scene,
                            except: None,
                        },
                        AiDespawn { id },
                    );
                    self.buffs.drop_target(&BuffTarget::Ai(id));
                    tracing::info!("AI {id} despawned");
                } else if let Some(id) = self.loot.host_unregister(entity, &mut self.ids) {
                    tracing::debug!("Container {id} destroyed");
                }
                self.health.unbind(&mut self.ctx.world, entity);
            }
            WorldEvent::AttackPerformed {
                entity,
                weapon_slot,
            } => {
                let scene = self.scene();
                self.ai
                    .host_attack(entity, weapon_slot, &scene, &mut self.outbox);
            }
            WorldEvent::InventoryChanged { inventory } => {
                let scene = self.scene();
                self.loot.host_on_inventory_changed(
                    &self.ctx.world,
                    inventory,
                    &scene,
                    &mut self.outbox,
                );
            }
            WorldEvent::ContainerSpawned {
                container,
                source_actor,
            } => {
                let actor_id = source_actor
                    .and_then(|e| self.ai.id_of(e))
                    .unwrap_or(NetId::INVALID);
                self.loot.host_on_dead_lootbox_spawned(
                    &self.ctx.world,
                    container,
                    actor_id,
                    now,
                    &mut self.ids,
                    &mut self.outbox,
                );
            }
            WorldEvent::SceneChanged { scene_id } => self.on_scene_changed(&scene_id, now),
            WorldEvent::SelfDamaged { .. } | WorldEvent::DamageDealt { .. } => {}
        }
    }

    fn client_event(&mut self, event: WorldEvent, now: Duration) {
        match event {
            WorldEvent::HealthChanged { entity, health } => {
                if self.health.local_entity() == Some(entity) {
                    self.health.on_local_changed(health, now, &mut self.outbox);
                }
            }
            WorldEvent::SelfDamaged { health } => {
                self.health.on_self_damaged(health, now, &mut self.outbox);
            }
            WorldEvent::DamageDealt { target, amount } => {
                if let Some(id) = self.ai.id_of(target) {
                    self.outbox
                        .push(Target::Host, AiDamage { id, amount });
                }
            }
            WorldEvent::SceneChanged { scene_id } => self.on_scene_changed(&scene_id, now),
            WorldEvent::ActorDestroyed { entity } => {
                self.health.unbind(&mut self.ctx.world, entity);
            }
            WorldEvent::ActorSpawned { .. }
            | WorldEvent::AttackPerformed { .. }
            | WorldEvent::InventoryChanged { .. }
            | WorldEvent::ContainerSpawned { .. } => {}
        }
    }

    /// Hand completed spawns to whoever requested them.
    pub(crate) fn resolve_spawns(&mut self, now: Duration) {
        for (ticket, entity) in self.ctx.world.poll_spawns() {
            if let Some(endpoint) = self.players.awaiting(ticket).map(str::to_string) {
                self.on_replica_spawned(&endpoint, entity, now);
                continue;
            }
            match self.ai.on_spawned(&mut self.ctx.world, ticket, entity) {
                SpawnResolution::Bound(id, entity) => {
                    self.bind_ai_mirror(id, entity, now);
                    continue;
                }
                SpawnResolution::Discarded => continue,
                SpawnResolution::NotMine => {}
            }
            if self.loot.on_spawned(&mut self.ctx.world, ticket, entity) == SpawnResolution::NotMine
            {
                tracing::debug!("Spawn {ticket:?} lost its target, destroying {entity}");
                self.ctx.world.destroy(entity);
            }
        }
    }

    /// Per-tick subsystem work.
    pub(crate) fn tick_subsystems(&mut self, now: Duration) {
        self.health.tick(&mut self.ctx.world, now, &mut self.outbox);
        match self.ctx.role {
            Role::Host => {
                let scene = self.scene();
                let budget = self.budget(Delivery::Unreliable);
                self.ai
                    .host_tick(&self.ctx.world, now, budget, &scene, &mut self.outbox);
                self.loot
                    .host_tick(&self.ctx.world, now, &scene, &mut self.outbox);
            }
            Role::Client => {
                let bound = self.ai.client_tick(&mut self.ctx.world, now);
                self.bind_ai_mirrors(bound, now);
            }
        }
    }

    /// Periodic status, position, ping and discovery traffic.
    pub(crate) fn run_intervals(&mut self, now: Duration) {
        let config = &self.ctx.config;
        let status_due = due(&mut self.intervals.status, now, config.status_interval());
        let position_due = due(&mut self.intervals.position, now, config.position_interval());
        let ping_due = due(&mut self.intervals.ping, now, config.ping_interval());
        let discovery_due = due(&mut self.intervals.discovery, now, config.discovery_interval());

        match self.ctx.role {
            Role::Host => {
                if status_due {
                    self.outbox.push(
                        Target::Broadcast { except: None },
                        PlayerList {
                            statuses: self.all_statuses(),
                        },
                    );
                    self.refresh_interest();
                }
                if position_due {
                    let scene = self.scene();
                    self.push_local_motion(Target::InScene {
                        scene_id: scene,
                        except: None,
                    });
                }
                if ping_due && !self.players.is_empty() {
                    self.ping_seq = self.ping_seq.wrapping_add(1);
                    self.pings.push_back((self.ping_seq, now));
                    while self.pings.len() > PING_HISTORY {
                        self.pings.pop_front();
                    }
                    self.outbox
                        .push(Target::Broadcast { except: None }, Ping { seq: self.ping_seq });
                }
                if discovery_due && self.ctx.transport.supports_discovery() {
                    let scene = self.scene();
                    let players = u16::try_from(self.players.len() + 1).unwrap_or(u16::MAX);
                    self.ctx
                        .transport
                        .announce(&self.ctx.local.display_name, &scene, players);
                }
            }
            Role::Client if self.welcomed => {
                if status_due {
                    self.outbox.push(
                        Target::Host,
                        ClientStatus {
                            status: self.local_status(),
                        },
                    );
                }
                if position_due {
                    self.push_local_motion(Target::Host);
                }
            }
            Role::Client => {}
        }
    }

    fn push_local_motion(&mut self, target: Target) {
        let world = &self.ctx.world;
        let Some(actor) = world.local_player().and_then(|p| world.actor(p)) else {
            return;
        };
        if !world.in_game() {
            return;
        }
        let endpoint_id = self.ctx.local.endpoint_id.clone();
        self.outbox.push(
            target.clone(),
            PlayerPosition {
                endpoint_id: endpoint_id.clone(),
                position: actor.position.into(),
                facing: actor.facing.into(),
            },
        );
        self.outbox.push(
            target,
            PlayerAnim {
                endpoint_id,
                anim: actor.anim,
            },
        );
    }

    /// Host: match a pong against the ping history.
    pub(crate) fn record_pong(&mut self, endpoint: &str, seq: u32, now: Duration) {
        let Some(&(_, sent)) = self.pings.iter().find(|(s, _)| *s == seq) else {
            tracing::debug!("Pong {seq} from {endpoint} is too old");
            return;
        };
        if let Some(entry) = self.players.get_mut(endpoint) {
            entry.rtt.record_sample(now.saturating_sub(sent));
            entry.status.latency_ms = entry.rtt.smoothed_ms();
        }
    }

    /// Send everything queued this tick.
    pub(crate) fn flush(&mut self) -> FlushStats {
        self.outbox
            .flush(self.ctx.transport.as_mut(), &self.players)
    }

    /// Drain transport events. Packets are returned for the router.
    pub(crate) fn poll_transport(&mut self) -> Vec<(PeerHandle, Vec<u8>)> {
        let mut packets = Vec::new();
        for event in self.ctx.transport.poll() {
            match event {
                TransportEvent::Connected(peer) => self.on_connected(peer),
                TransportEvent::Disconnected(peer) => self.on_disconnected(peer),
                TransportEvent::Packet { from, bytes } => packets.push((from, bytes)),
            }
        }
        packets
    }

    fn on_connected(&mut self, peer: PeerHandle) {
        match self.ctx.role {
            Role::Host => tracing::debug!("{peer} connected, waiting for hello"),
            Role::Client => {
                tracing::info!("Connected to host {peer}");
                self.host_peer = Some(peer);
                self.outbox.push(
                    Target::Host,
                    ClientHello {
                        endpoint_id: self.ctx.local.endpoint_id.clone(),
                        display_name: self.ctx.local.display_name.clone(),
                        scene_id: self.scene(),
                        protocol_version: PROTOCOL_VERSION,
                    },
                );
                self.health.report_local(&self.ctx.world, &mut self.outbox);
            }
        }
    }

    fn on_disconnected(&mut self, peer: PeerHandle) {
        match self.ctx.role {
            Role::Host => {
                let Some(endpoint) = self.players.endpoint_of(&peer).map(str::to_string) else {
                    tracing::debug!("{peer} disconnected before saying hello");
                    return;
                };
                self.remove_player(&endpoint);
                self.outbox.push(
                    Target::Broadcast { except: None },
                    PlayerLeft {
                        endpoint_id: endpoint.clone(),
                    },
                );
                tracing::info!("{endpoint} left the session");
            }
            Role::Client => {
                if self.host_peer.as_ref() == Some(&peer) {
                    tracing::warn!("Lost connection to host {peer}");
                    self.teardown();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_fires_then_waits() {
        let mut next = Duration::ZERO;
        let every = Duration::from_millis(500);
        assert!(due(&mut next, Duration::ZERO, every));
        assert!(!due(&mut next, Duration::from_millis(499), every));
        assert!(due(&mut next, Duration::from_millis(500), every));
        assert_eq!(next, Duration::from_millis(1000));
    }
}
