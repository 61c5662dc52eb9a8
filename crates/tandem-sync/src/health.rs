//! Host-authoritative health replication.
//!
//! Every tracked entity moves `Unbound -> Bound -> (Sending | Suppressed)`.
//! On the host a binding owns the entity's truth: it force-applies the best
//! known value, subscribes to change events and propagates changes under a
//! per-entity cooldown. On clients a mirror binding only force-applies values
//! pushed by the host. The client's own player reports local damage to the
//! host and filters the host's stale echoes.

use std::collections::HashMap;
use std::time::Duration;

use tandem_config::SyncConfig;
use tandem_net::messages::{AiHealth, HealthReport, NetId, RemoteHealth, SelfHealth};

use crate::outbox::{Outbox, Target};
use crate::pending::{Deferral, PendingBuffer};
use crate::world::{EntityRef, Health, HealthAccess};

// ---------------------------------------------------------------------------
// Keys and owners
// ---------------------------------------------------------------------------

/// Key under which early health snapshots are parked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthKey {
    /// A player replica, by endpoint id.
    Player(String),
    /// An AI actor.
    Ai(NetId),
}

/// Whose health an authoritative binding carries (host side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOwner {
    /// A client's player, represented by a local replica.
    Remote(String),
    /// The host's own player.
    Local(String),
    /// A host-simulated AI actor.
    Ai(NetId),
}

impl HealthOwner {
    fn key(&self) -> Option<HealthKey> {
        match self {
            HealthOwner::Remote(endpoint) => Some(HealthKey::Player(endpoint.clone())),
            HealthOwner::Local(_) => None,
            HealthOwner::Ai(id) => Some(HealthKey::Ai(*id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Authority(HealthOwner),
    Mirror(HealthKey),
}

impl Mode {
    fn key(&self) -> Option<HealthKey> {
        match self {
            Mode::Authority(owner) => owner.key(),
            Mode::Mirror(key) => Some(key.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    mode: Mode,
    last_known: Health,
    last_sent: Option<Health>,
    next_allowed: Duration,
    dirty: bool,
    ui_retries_left: u32,
    next_ui_retry: Duration,
}

/// Result of applying a self-authoritative value from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfHealthOutcome {
    /// The value was applied.
    Applied,
    /// Dropped as a stale echo of pre-damage state.
    StaleEcho,
    /// No local player to apply it to.
    NoPlayer,
}

#[derive(Debug, Clone, Copy)]
struct Mute {
    until: Duration,
    value: Health,
}

#[derive(Debug, Default)]
struct LocalReporter {
    entity: Option<EntityRef>,
    last_self_damage: Option<Duration>,
    mute: Option<Mute>,
    last_reported: Option<Health>,
}

// ---------------------------------------------------------------------------
// HealthSync
// ---------------------------------------------------------------------------

/// Health bindings of one session participant.
#[derive(Debug)]
pub struct HealthSync {
    cooldown: Duration,
    echo_window: Duration,
    mute_window: Duration,
    default_health: f32,
    ui_retries: u32,
    ui_interval: Duration,
    bindings: HashMap<EntityRef, Binding>,
    pending: PendingBuffer<HealthKey, Health>,
    local: LocalReporter,
}

impl HealthSync {
    /// Empty state with windows and defaults from `config`.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            cooldown: config.health_cooldown(),
            echo_window: config.echo_window(),
            mute_window: config.health_mute(),
            default_health: config.default_health,
            ui_retries: config.health_ui_retries,
            ui_interval: config.health_ui_retry_interval(),
            bindings: HashMap::new(),
            pending: PendingBuffer::new("health"),
            local: LocalReporter::default(),
        }
    }

    /// Whether the entity has a binding.
    pub fn is_bound(&self, entity: EntityRef) -> bool {
        self.bindings.contains_key(&entity)
    }

    /// Number of bindings.
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    /// Parked snapshot for a key.
    pub fn pending(&self, key: &HealthKey) -> Option<Health> {
        self.pending.get(key).copied()
    }

    /// Number of parked snapshots.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop a parked snapshot, used when its owner leaves.
    pub fn drop_pending(&mut self, key: &HealthKey) {
        self.pending.take(key);
    }

    /// Drop every parked AI snapshot.
    pub fn drop_pending_ai(&mut self) {
        self.pending.retain(|key, _| !matches!(key, HealthKey::Ai(_)));
    }

    // -- Binding --------------------------------------------------------------

    fn initial_value(
        &mut self,
        world: &mut impl HealthAccess,
        entity: EntityRef,
        key: Option<HealthKey>,
    ) -> Health {
        world.set_autonomous_init(entity, false);
        let value = key
            .and_then(|k| self.pending.take(&k))
            .filter(|h| h.is_valid())
            .or_else(|| world.health(entity).filter(|h| h.is_valid()))
            .unwrap_or(Health::new(self.default_health, self.default_health));
        world.force_set_health(entity, value);
        value
    }

    fn insert(&mut self, entity: EntityRef, mode: Mode, value: Health, now: Duration) {
        self.bindings.insert(
            entity,
            Binding {
                mode,
                last_known: value,
                last_sent: None,
                next_allowed: now,
                dirty: false,
                ui_retries_left: self.ui_retries,
                next_ui_retry: now + self.ui_interval,
            },
        );
    }

    /// Host: take ownership of an entity's health and announce it.
    pub fn bind_authority(
        &mut self,
        world: &mut impl HealthAccess,
        entity: EntityRef,
        owner: HealthOwner,
        now: Duration,
        outbox: &mut Outbox,
    ) -> Health {
        let value = self.initial_value(world, entity, owner.key());
        world.subscribe_health(entity);
        tracing::debug!("Bound health of {entity} for {owner:?} at {}/{}", value.current, value.max);
        self.insert(entity, Mode::Authority(owner), value, now);
        self.propagate(entity, value, now, outbox);
        value
    }

    /// Client: mirror host-owned health onto a local entity.
    pub fn bind_mirror(
        &mut self,
        world: &mut impl HealthAccess,
        entity: EntityRef,
        key: HealthKey,
        now: Duration,
    ) -> Health {
        let value = self.initial_value(world, entity, Some(key.clone()));
        self.insert(entity, Mode::Mirror(key), value, now);
        value
    }

    /// Release a binding.
    pub fn unbind(&mut self, world: &mut impl HealthAccess, entity: EntityRef) {
        if let Some(binding) = self.bindings.remove(&entity)
            && matches!(binding.mode, Mode::Authority(_))
        {
            world.unsubscribe_health(entity);
        }
    }

    /// Release a binding whose entity may come back, such as a replica
    /// leaving interest. The last known value is parked under the binding's
    /// key so the next bind restores it instead of the default.
    pub fn release(&mut self, world: &mut impl HealthAccess, entity: EntityRef) {
        let Some(binding) = self.bindings.get(&entity) else {
            return;
        };
        let key = binding.mode.key();
        let last = world
            .health(entity)
            .filter(|h| h.is_valid())
            .unwrap_or(binding.last_known);
        self.unbind(world, entity);
        if let Some(key) = key
            && last.is_valid()
        {
            tracing::debug!("Keeping {}/{} for {key:?}", last.current, last.max);
            self.pending.defer(key, last);
        }
    }

    /// Release every binding, every parked value and the local subscription.
    pub fn unbind_all(&mut self, world: &mut impl HealthAccess) {
        let entities: Vec<_> = self.bindings.keys().copied().collect();
        for entity in entities {
            self.unbind(world, entity);
        }
        self.pending.clear();
        if let Some(player) = self.local.entity.take() {
            world.unsubscribe_health(player);
        }
        self.local = LocalReporter::default();
    }

    // -- Host propagation -----------------------------------------------------

    /// Host: a subscribed entity's health changed.
    pub fn on_changed(
        &mut self,
        entity: EntityRef,
        health: Health,
        now: Duration,
        outbox: &mut Outbox,
    ) {
        self.propagate(entity, health, now, outbox);
    }

    fn propagate(&mut self, entity: EntityRef, health: Health, now: Duration, outbox: &mut Outbox) {
        let cooldown = self.cooldown;
        let Some(binding) = self.bindings.get_mut(&entity) else {
            return;
        };
        if health.is_valid() {
            binding.last_known = health;
        }
        let Mode::Authority(owner) = &binding.mode else {
            return;
        };
        if binding.last_sent == Some(health) {
            binding.dirty = false;
            return;
        }
        if now < binding.next_allowed {
            tracing::trace!("Health of {entity} changed during cooldown");
            binding.dirty = true;
            return;
        }
        send_health(owner, health, outbox);
        binding.last_sent = Some(health);
        binding.next_allowed = now + cooldown;
        binding.dirty = false;
    }

    /// Flush cooled-down dirty records and run health UI retries.
    pub fn tick(&mut self, world: &mut impl HealthAccess, now: Duration, outbox: &mut Outbox) {
        let mut flush = Vec::new();
        for (entity, binding) in &mut self.bindings {
            if binding.dirty && now >= binding.next_allowed {
                flush.push(*entity);
            }
            if binding.ui_retries_left > 0 && now >= binding.next_ui_retry {
                if world.ensure_health_ui(*entity) {
                    binding.ui_retries_left = 0;
                } else {
                    binding.ui_retries_left -= 1;
                    binding.next_ui_retry = now + self.ui_interval;
                }
            }
        }
        for entity in flush {
            // The latest live value wins over whatever changed in between.
            match world.health(entity) {
                Some(live) => self.propagate(entity, live, now, outbox),
                None => {
                    if let Some(binding) = self.bindings.get_mut(&entity) {
                        binding.dirty = false;
                    }
                }
            }
        }
    }

    // -- Snapshots --------------------------------------------------------------

    /// Apply a snapshot to a bound entity, or park it.
    ///
    /// Host: a client's own report onto its replica. Client: a host push onto
    /// a mirror. Snapshots with a non-positive max are never applied.
    pub fn apply_snapshot(
        &mut self,
        world: &mut impl HealthAccess,
        key: HealthKey,
        health: Health,
        entity: Option<EntityRef>,
    ) -> Deferral {
        let bound = entity.and_then(|e| self.bindings.get_mut(&e).map(|b| (e, b)));
        self.pending.apply_or_defer(key, health, |h| match bound {
            Some((entity, binding)) if h.is_valid() => {
                world.force_set_health(entity, h);
                binding.last_known = h;
                Ok(())
            }
            _ => Err(h),
        })
    }

    // -- Client local player --------------------------------------------------

    /// Client: follow the local player's health.
    pub fn track_local(&mut self, world: &mut impl HealthAccess, player: EntityRef) {
        if self.local.entity == Some(player) {
            return;
        }
        if let Some(previous) = self.local.entity.replace(player) {
            world.unsubscribe_health(previous);
        }
        world.subscribe_health(player);
        self.local.last_reported = None;
    }

    /// The tracked local player.
    pub fn local_entity(&self) -> Option<EntityRef> {
        self.local.entity
    }

    /// Client: local simulation damaged the player.
    pub fn on_self_damaged(&mut self, health: Health, now: Duration, outbox: &mut Outbox) {
        self.local.last_self_damage = Some(now);
        self.report(health, outbox);
    }

    /// Client: the local player's health changed.
    pub fn on_local_changed(&mut self, health: Health, now: Duration, outbox: &mut Outbox) {
        if let Some(mute) = self.local.mute
            && now < mute.until
            && mute.value == health
        {
            tracing::debug!("Muted health change {}/{}", health.current, health.max);
            return;
        }
        self.report(health, outbox);
    }

    /// Client: report the local player's live value unconditionally.
    ///
    /// Sent right after the hello so the host binds our replica with it.
    pub fn report_local(&mut self, world: &impl HealthAccess, outbox: &mut Outbox) {
        let Some(health) = self.local.entity.and_then(|p| world.health(p)) else {
            return;
        };
        self.local.last_reported = None;
        self.report(health, outbox);
    }

    fn report(&mut self, health: Health, outbox: &mut Outbox) {
        if !health.is_valid() || self.local.last_reported == Some(health) {
            return;
        }
        self.local.last_reported = Some(health);
        outbox.push(
            Target::Host,
            HealthReport {
                max: health.max,
                current: health.current,
            },
        );
    }

    /// Client: the host pushed the authoritative value of the local player.
    pub fn on_self_health(
        &mut self,
        world: &mut impl HealthAccess,
        health: Health,
        now: Duration,
    ) -> SelfHealthOutcome {
        let Some(player) = self.local.entity else {
            return SelfHealthOutcome::NoPlayer;
        };
        let Some(live) = world.health(player) else {
            return SelfHealthOutcome::NoPlayer;
        };
        if let Some(damaged_at) = self.local.last_self_damage
            && now.saturating_sub(damaged_at) < self.echo_window
            && health.current > live.current
        {
            tracing::debug!(
                "Dropping stale health echo {} (live {})",
                health.current,
                live.current
            );
            return SelfHealthOutcome::StaleEcho;
        }
        self.local.mute = Some(Mute {
            until: now + self.mute_window,
            value: health,
        });
        self.local.last_reported = Some(health);
        world.force_set_health(player, health);
        SelfHealthOutcome::Applied
    }
}

fn send_health(owner: &HealthOwner, health: Health, outbox: &mut Outbox) {
    let Health { max, current } = health;
    match owner {
        HealthOwner::Remote(endpoint) => {
            outbox.push(Target::Endpoint(endpoint.clone()), SelfHealth { max, current });
            outbox.push(
                Target::Broadcast {
                    except: Some(endpoint.clone()),
                },
                RemoteHealth {
                    endpoint_id: endpoint.clone(),
                    max,
                    current,
                },
            );
        }
        HealthOwner::Local(endpoint) => outbox.push(
            Target::Broadcast { except: None },
            RemoteHealth {
                endpoint_id: endpoint.clone(),
                max,
                current,
            },
        ),
        HealthOwner::Ai(id) => outbox.push(
            Target::Broadcast { except: None },
            AiHealth {
                id: *id,
                max,
                current,
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use crate::world::{AiAppearance, EntityFactory, GameWorld, WorldEvent};
    use glam::Vec3;
    use tandem_net::messages::Message;

    const MS: Duration = Duration::from_millis(1);

    fn setup() -> (HealthSync, MemoryWorld, Outbox) {
        (
            HealthSync::new(&SyncConfig::default()),
            MemoryWorld::new("level_01"),
            Outbox::new(),
        )
    }

    fn sent(outbox: &mut Outbox) -> Vec<Message> {
        outbox.drain().into_iter().map(|o| o.message).collect()
    }

    fn changes(world: &mut MemoryWorld) -> Vec<(EntityRef, Health)> {
        world
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                WorldEvent::HealthChanged { entity, health } => Some((entity, health)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_bind_prefers_pending_then_live_then_default() {
        let (mut health, mut world, mut outbox) = setup();
        let key = HealthKey::Player("p1".into());
        let a = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(80.0, 60.0));

        health.apply_snapshot(&mut world, key.clone(), Health::new(50.0, 20.0), None);
        let value = health.bind_authority(&mut world, a, HealthOwner::Remote("p1".into()), Duration::ZERO, &mut outbox);
        assert_eq!(value, Health::new(50.0, 20.0));
        assert_eq!(health.pending(&key), None);

        let b = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(80.0, 60.0));
        let value = health.bind_authority(&mut world, b, HealthOwner::Ai(NetId(1)), Duration::ZERO, &mut outbox);
        assert_eq!(value, Health::new(80.0, 60.0));

        let c = world.place_container(Vec3::ZERO, 1, false);
        let value = health.bind_mirror(&mut world, c, HealthKey::Ai(NetId(2)), Duration::ZERO);
        assert_eq!(value, Health::new(40.0, 40.0));
        assert!(!world.entity(c).unwrap().autonomous_init);
    }

    #[test]
    fn test_player_binding_sends_self_and_remote_forms() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        health.bind_authority(&mut world, e, HealthOwner::Remote("p1".into()), Duration::ZERO, &mut outbox);
        let out = outbox.drain();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].target, Target::Endpoint("p1".into()));
        assert_eq!(out[0].message, Message::SelfHealth(SelfHealth { max: 40.0, current: 40.0 }));
        assert_eq!(out[1].target, Target::Broadcast { except: Some("p1".into()) });
    }

    #[test]
    fn test_cooldown_sends_latest_live_value_once() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        health.bind_authority(&mut world, e, HealthOwner::Ai(NetId(1)), Duration::ZERO, &mut outbox);
        outbox.drain();

        // Inside the cooldown: marked dirty, nothing sent.
        world.apply_damage(e, 5.0);
        world.apply_damage(e, 5.0);
        for (entity, h) in changes(&mut world) {
            health.on_changed(entity, h, 10 * MS, &mut outbox);
        }
        assert!(outbox.is_empty());

        health.tick(&mut world, 49 * MS, &mut outbox);
        assert!(outbox.is_empty());

        health.tick(&mut world, 50 * MS, &mut outbox);
        assert_eq!(
            sent(&mut outbox),
            vec![Message::AiHealth(AiHealth { id: NetId(1), max: 40.0, current: 30.0 })]
        );
        health.tick(&mut world, 200 * MS, &mut outbox);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_unchanged_value_is_not_resent() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        health.bind_authority(&mut world, e, HealthOwner::Ai(NetId(1)), Duration::ZERO, &mut outbox);
        outbox.drain();
        health.on_changed(e, Health::new(40.0, 40.0), 100 * MS, &mut outbox);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_uninitialized_report_is_parked_until_valid() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        health.bind_authority(&mut world, e, HealthOwner::Remote("p1".into()), Duration::ZERO, &mut outbox);
        let key = HealthKey::Player("p1".into());

        let first = health.apply_snapshot(&mut world, key.clone(), Health::new(0.0, 0.0), Some(e));
        assert_eq!(first, Deferral::Deferred);
        assert!(health.pending(&key).is_some());

        let second = health.apply_snapshot(&mut world, key.clone(), Health::new(40.0, 40.0), Some(e));
        assert_eq!(second, Deferral::Applied);
        assert_eq!(health.pending(&key), None);
        assert_eq!(world.health(e), Some(Health::new(40.0, 40.0)));
    }

    #[test]
    fn test_unbound_target_defers_and_binding_applies_once() {
        let (mut health, mut world, mut outbox) = setup();
        let key = HealthKey::Ai(NetId(4));
        health.apply_snapshot(&mut world, key.clone(), Health::new(60.0, 25.0), None);
        assert_eq!(health.pending_len(), 1);

        let e = world.place_container(Vec3::ZERO, 1, false);
        health.bind_mirror(&mut world, e, key.clone(), Duration::ZERO);
        assert_eq!(world.health(e), Some(Health::new(60.0, 25.0)));
        assert_eq!(health.pending_len(), 0);

        // Registered first: applied directly, no entry created.
        assert_eq!(
            health.apply_snapshot(&mut world, key, Health::new(60.0, 20.0), Some(e)),
            Deferral::Applied
        );
        assert_eq!(health.pending_len(), 0);
        outbox.drain();
    }

    #[test]
    fn test_stale_echo_is_dropped_inside_window() {
        let (mut health, mut world, mut outbox) = setup();
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 8);
        health.track_local(&mut world, player);

        let t0 = Duration::from_secs(5);
        let after = world.damage_local_player(30.0).unwrap();
        health.on_self_damaged(after, t0, &mut outbox);
        assert_eq!(
            sent(&mut outbox),
            vec![Message::HealthReport(HealthReport { max: 40.0, current: 10.0 })]
        );

        let outcome = health.on_self_health(&mut world, Health::new(40.0, 40.0), t0 + 100 * MS);
        assert_eq!(outcome, SelfHealthOutcome::StaleEcho);
        assert_eq!(world.health(player), Some(Health::new(40.0, 10.0)));

        // Lower values always apply.
        let outcome = health.on_self_health(&mut world, Health::new(40.0, 8.0), t0 + 150 * MS);
        assert_eq!(outcome, SelfHealthOutcome::Applied);

        // Outside the window the host wins.
        let outcome = health.on_self_health(&mut world, Health::new(40.0, 40.0), t0 + 500 * MS);
        assert_eq!(outcome, SelfHealthOutcome::Applied);
        assert_eq!(world.health(player), Some(Health::new(40.0, 40.0)));
    }

    #[test]
    fn test_applied_value_is_muted() {
        let (mut health, mut world, mut outbox) = setup();
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 8);
        health.track_local(&mut world, player);
        let t0 = Duration::from_secs(1);

        health.on_self_health(&mut world, Health::new(40.0, 25.0), t0);
        for (_, h) in changes(&mut world) {
            health.on_local_changed(h, t0 + 10 * MS, &mut outbox);
        }
        assert!(outbox.is_empty());

        health.on_local_changed(Health::new(40.0, 20.0), t0 + 20 * MS, &mut outbox);
        assert_eq!(outbox.len(), 1);
    }

    #[test]
    fn test_health_ui_retries_are_bounded() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        world.entity_mut(e).unwrap().health_ui_delay = 10;
        health.bind_authority(&mut world, e, HealthOwner::Ai(NetId(1)), Duration::ZERO, &mut outbox);
        for step in 1..=10 {
            health.tick(&mut world, Duration::from_millis(250 * step), &mut outbox);
        }
        assert_eq!(world.entity(e).unwrap().health_ui_delay, 7);
    }

    #[test]
    fn test_release_keeps_last_known_for_next_bind() {
        let (mut health, mut world, _) = setup();
        let key = HealthKey::Player("host".into());
        let first = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(100.0, 100.0));
        health.bind_mirror(&mut world, first, key.clone(), Duration::ZERO);
        health.apply_snapshot(&mut world, key.clone(), Health::new(100.0, 70.0), Some(first));

        // The scene unload removes the entity before the binding goes.
        world.destroy(first);
        health.release(&mut world, first);
        assert_eq!(health.bound_count(), 0);
        assert_eq!(health.pending(&key), Some(Health::new(100.0, 70.0)));

        let second = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(100.0, 100.0));
        let value = health.bind_mirror(&mut world, second, key.clone(), Duration::ZERO);
        assert_eq!(value, Health::new(100.0, 70.0));
        assert_eq!(health.pending(&key), None);
    }

    #[test]
    fn test_release_of_authority_parks_live_value() {
        let (mut health, mut world, mut outbox) = setup();
        let key = HealthKey::Player("c1".into());
        let replica = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(100.0, 100.0));
        health.bind_authority(&mut world, replica, HealthOwner::Remote("c1".into()), Duration::ZERO, &mut outbox);
        health.apply_snapshot(&mut world, key.clone(), Health::new(100.0, 55.0), Some(replica));

        health.release(&mut world, replica);
        assert!(!world.entity(replica).unwrap().subscribed);
        assert_eq!(health.pending(&key), Some(Health::new(100.0, 55.0)));
    }

    #[test]
    fn test_unbind_parks_nothing_and_unbind_all_clears() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        health.bind_authority(&mut world, e, HealthOwner::Ai(NetId(3)), Duration::ZERO, &mut outbox);
        health.unbind(&mut world, e);
        assert_eq!(health.pending_len(), 0);

        health.apply_snapshot(&mut world, HealthKey::Ai(NetId(9)), Health::new(10.0, 10.0), None);
        health.unbind_all(&mut world);
        assert_eq!(health.pending_len(), 0);
    }

    #[test]
    fn test_unbind_releases_subscription() {
        let (mut health, mut world, mut outbox) = setup();
        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(40.0, 40.0));
        health.bind_authority(&mut world, e, HealthOwner::Ai(NetId(1)), Duration::ZERO, &mut outbox);
        assert!(world.entity(e).unwrap().subscribed);
        health.unbind_all(&mut world);
        assert!(!world.entity(e).unwrap().subscribed);
        assert_eq!(health.bound_count(), 0);
    }
}
