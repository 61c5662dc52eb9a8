//! Scripted stand-in for the game simulation.
//!
//! The host walks in a circle, spawns a few AI actors that swing their
//! weapons and eventually die into loot containers. Clients walk, hurt
//! themselves now and then, shoot the nearest AI and loot whatever the host
//! dropped.

use std::time::Duration;

use glam::Vec3;
use tandem_net::item::ItemTree;
use tandem_net::messages::NetId;
use tandem_net::routing::Role;
use tandem_sync::memory::EntityKind;
use tandem_sync::world::{ActorAccess, HealthAccess, SceneAccess};
use tandem_sync::{AiAppearance, EntityRef, Health, MemoryWorld, SyncNode};

const MAX_LIVE_AI: usize = 3;
const AI_SPAWN_EVERY: Duration = Duration::from_secs(4);
const AI_LIFETIME: Duration = Duration::from_secs(10);
const ATTACK_EVERY: Duration = Duration::from_secs(1);
const SELF_DAMAGE_EVERY: Duration = Duration::from_secs(5);
const SHOOT_EVERY: Duration = Duration::from_millis(1500);
const LOOT_EVERY: Duration = Duration::from_secs(3);

#[derive(Debug)]
struct LiveAi {
    entity: EntityRef,
    born: Duration,
    next_attack: Duration,
}

/// Per-participant script state.
#[derive(Debug)]
pub struct Activity {
    role: Role,
    radius: f32,
    elapsed: Duration,
    next_spawn: Duration,
    next_damage: Duration,
    next_shot: Duration,
    next_loot: Duration,
    live: Vec<LiveAi>,
    dropped: i32,
}

impl Activity {
    /// Script for one participant. `radius` separates walkers.
    pub fn new(role: Role, radius: f32) -> Self {
        Self {
            role,
            radius,
            elapsed: Duration::ZERO,
            next_spawn: Duration::from_secs(1),
            next_damage: SELF_DAMAGE_EVERY,
            next_shot: SHOOT_EVERY,
            next_loot: LOOT_EVERY,
            live: Vec::new(),
            dropped: 0,
        }
    }

    /// Advance the script by `dt`.
    pub fn step(&mut self, node: &mut SyncNode<MemoryWorld>, dt: Duration) {
        self.elapsed += dt;
        self.walk(node.world_mut());
        match self.role {
            Role::Host => self.host_step(node.world_mut()),
            Role::Client if node.is_joined() => self.client_step(node),
            Role::Client => {}
        }
    }

    fn walk(&self, world: &mut MemoryWorld) {
        let Some(player) = world.local_player() else {
            return;
        };
        let angle = self.elapsed.as_secs_f32() * 0.5;
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * self.radius;
        let facing = Vec3::new(-angle.sin(), 0.0, angle.cos());
        world.set_transform(player, position, facing);
    }

    fn host_step(&mut self, world: &mut MemoryWorld) {
        let now = self.elapsed;

        if now >= self.next_spawn && self.live.len() < MAX_LIVE_AI {
            self.next_spawn = now + AI_SPAWN_EVERY;
            let slot = self.live.len() as f32;
            let entity = world.spawn_ai(
                AiAppearance {
                    model_key: "scav".to_string(),
                    weapons: vec![12],
                    face: vec![slot as u8],
                },
                Vec3::new(6.0 + 2.0 * slot, 0.0, -4.0),
                Health::new(60.0, 60.0),
            );
            self.live.push(LiveAi {
                entity,
                born: now,
                next_attack: now + ATTACK_EVERY,
            });
        }

        for ai in &mut self.live {
            if now >= ai.next_attack {
                ai.next_attack = now + ATTACK_EVERY;
                world.perform_attack(ai.entity, 0);
            }
        }

        let (dead, alive): (Vec<_>, Vec<_>) = self.live.drain(..).partition(|ai| {
            now.saturating_sub(ai.born) >= AI_LIFETIME
                || world.health(ai.entity).is_none_or(|h| h.current <= 0.0)
        });
        self.live = alive;
        for ai in dead {
            let position = world
                .actor(ai.entity)
                .map(|a| a.position)
                .unwrap_or_default();
            self.dropped += 1;
            world.spawn_lootbox(
                Some(ai.entity),
                position,
                6,
                vec![
                    ItemTree::simple(100 + self.dropped, 1),
                    ItemTree::simple(7, 20),
                ],
            );
            world.kill(ai.entity);
        }
    }

    fn client_step(&mut self, node: &mut SyncNode<MemoryWorld>) {
        let now = self.elapsed;

        if now >= self.next_damage {
            self.next_damage = now + SELF_DAMAGE_EVERY;
            let world = node.world_mut();
            if let Some(player) = world.local_player()
                && world.health(player).is_some_and(|h| h.current > 10.0)
            {
                world.damage_local_player(5.0);
            }
        }

        if now >= self.next_shot {
            self.next_shot = now + SHOOT_EVERY;
            let target = node
                .ai()
                .bound()
                .into_iter()
                .map(|(_, entity)| entity)
                .find(|e| node.world().health(*e).is_some_and(|h| h.current > 0.0));
            if let Some(target) = target {
                node.world_mut().deal_damage(target, 15.0);
            }
        }

        if now >= self.next_loot {
            self.next_loot = now + LOOT_EVERY;
            if let Some((id, slot)) = first_lootable(node) {
                match node.take(id, slot) {
                    Ok(token) => tracing::info!("Taking slot {slot} of container {id} (token {token})"),
                    Err(e) => tracing::warn!("Could not loot {id}: {e}"),
                }
            }
        }
    }
}

fn first_lootable(node: &SyncNode<MemoryWorld>) -> Option<(NetId, u16)> {
    let world = node.world();
    world
        .entities()
        .into_iter()
        .filter(|e| world.entity(*e).is_some_and(|m| m.kind == EntityKind::Container))
        .filter_map(|e| node.loot().id_of(e))
        .find_map(|id| {
            let items = node.container_items(id)?;
            items.first().map(|(slot, _)| (id, *slot))
        })
}
