//! The public face of the sync core.
//!
//! [`SyncNode`] owns the router and the session. The embedder calls
//! [`SyncNode::tick`] at a fixed rate from the simulation thread; everything
//! inbound and outbound happens inside that call.

use tandem_net::item::ItemTree;
use tandem_net::messages::{BuffApply, BuffTarget, NetId};
use tandem_net::routing::{DispatchOutcome, Role, Router, RouterStats};
use tandem_net::transport::PeerHandle;

use crate::ai::AiSync;
use crate::error::SyncError;
use crate::handlers::build_router;
use crate::health::HealthSync;
use crate::loot::LootSync;
use crate::outbox::{FlushStats, Target};
use crate::pending::Deferral;
use crate::players::PlayerRegistry;
use crate::session::{Session, SessionContext};
use crate::world::{EntityRef, GameWorld};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Packets handed to the router.
    pub dispatched: usize,
    /// Outbound delivery counters.
    pub flushed: FlushStats,
}

/// A running host or client.
pub struct SyncNode<W: GameWorld + 'static> {
    router: Router<Session<W>, SyncError>,
    session: Session<W>,
}

impl<W: GameWorld + 'static> SyncNode<W> {
    /// Start a session.
    pub fn init(ctx: SessionContext<W>) -> Self {
        let role = ctx.role;
        tracing::info!(
            "Starting {role:?} session as {} ({})",
            ctx.local.endpoint_id,
            ctx.local.display_name
        );
        let mut session = Session::new(ctx);
        if role == Role::Host {
            let now = session.now();
            session.register_scene_actors(now);
        }
        Self {
            router: build_router(role),
            session,
        }
    }

    /// Run one simulation tick.
    pub fn tick(&mut self) -> TickReport {
        let s = &mut self.session;
        let now = s.now();

        s.ensure_local_health(now);
        s.process_events(now);

        let packets = s.poll_transport();
        let dispatched = packets.len();
        for (from, bytes) in packets {
            self.router.dispatch(&mut self.session, Some(from), bytes);
        }

        let s = &mut self.session;
        s.resolve_spawns(now);
        s.ensure_local_health(now);
        s.process_events(now);
        s.tick_subsystems(now);
        s.run_intervals(now);

        TickReport {
            dispatched,
            flushed: s.flush(),
        }
    }

    /// Feed one raw packet through the router outside the tick.
    pub fn dispatch(&mut self, sender: Option<PeerHandle>, bytes: Vec<u8>) -> DispatchOutcome {
        self.router.dispatch(&mut self.session, sender, bytes)
    }

    /// Release every subscription and close the transport.
    pub fn shutdown(&mut self) {
        let s = &mut self.session;
        s.flush();
        s.teardown();
        s.ctx.transport.shutdown();
        tracing::info!("{:?} session of {} shut down", s.ctx.role, s.ctx.local.endpoint_id);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Session role.
    pub fn role(&self) -> Role {
        self.session.ctx.role
    }

    /// The game world.
    pub fn world(&self) -> &W {
        &self.session.ctx.world
    }

    /// The game world, mutably.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.session.ctx.world
    }

    /// Known remote participants.
    pub fn players(&self) -> &PlayerRegistry {
        &self.session.players
    }

    /// Health bindings.
    pub fn health(&self) -> &HealthSync {
        &self.session.health
    }

    /// AI registry.
    pub fn ai(&self) -> &AiSync {
        &self.session.ai
    }

    /// Loot registry.
    pub fn loot(&self) -> &LootSync {
        &self.session.loot
    }

    /// Dispatch counters.
    pub fn router_stats(&self) -> &RouterStats {
        self.router.stats()
    }

    /// Whether the host accepted us (always true on the host).
    pub fn is_joined(&self) -> bool {
        self.session.is_host() || self.session.welcomed
    }

    /// Endpoint id of the host, once welcomed.
    pub fn host_endpoint(&self) -> Option<&str> {
        if self.session.is_host() {
            return Some(&self.session.ctx.local.endpoint_id);
        }
        self.session.host_endpoint.as_deref()
    }

    // -----------------------------------------------------------------------
    // Host operations
    // -----------------------------------------------------------------------

    /// Register a container the simulation just dropped and announce it.
    ///
    /// `actor_id` is the AI it came from; pass [`NetId::INVALID`] for
    /// containers placed by the scene.
    pub fn host_on_dead_lootbox_spawned(&mut self, container: EntityRef, actor_id: NetId) -> Option<NetId> {
        let s = &mut self.session;
        if !s.is_host() {
            return None;
        }
        let now = s.now();
        s.loot.host_on_dead_lootbox_spawned(
            &s.ctx.world,
            container,
            actor_id,
            now,
            &mut s.ids,
            &mut s.outbox,
        )
    }

    /// Apply a buff locally and replicate it.
    pub fn apply_buff(&mut self, target: BuffTarget, buff_id: i32, duration: f32) -> Deferral {
        let s = &mut self.session;
        let now = s.now();
        let entity = s.buff_entity(&target);
        let result = s.buffs.apply(
            &mut s.ctx.world,
            target.clone(),
            buff_id,
            duration,
            entity,
            now,
        );
        let to = if s.is_host() {
            Target::Broadcast { except: None }
        } else {
            Target::Host
        };
        s.outbox.push(
            to,
            BuffApply {
                target,
                buff_id,
                duration,
            },
        );
        result
    }

    // -----------------------------------------------------------------------
    // Client loot operations
    // -----------------------------------------------------------------------

    fn require_host(&self) -> Result<(), SyncError> {
        if self.session.is_host() || self.session.welcomed {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    /// Ask the host for a container's contents.
    pub fn open_container(&mut self, container: NetId) -> Result<(), SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        s.loot.client_open(container, &mut s.outbox);
        Ok(())
    }

    /// Move an item from the local inventory into a container. Returns the token.
    pub fn put_from_inventory(
        &mut self,
        container: NetId,
        inventory_slot: u16,
        dest_slot: Option<u16>,
    ) -> Result<u32, SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        s.loot.client_put_from_inventory(
            &mut s.ctx.world,
            container,
            inventory_slot,
            dest_slot,
            &mut s.outbox,
        )
    }

    /// Move an item between two containers.
    pub fn put_from_container(
        &mut self,
        container: NetId,
        source: NetId,
        source_slot: u16,
        dest_slot: Option<u16>,
    ) -> Result<u32, SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        if s.loot.entity_of(source).is_none() {
            return Err(SyncError::UnknownContainer(source.0));
        }
        Ok(s
            .loot
            .client_put_from_container(container, source, source_slot, dest_slot, &mut s.outbox))
    }

    /// Take an item into the local inventory.
    pub fn take(&mut self, container: NetId, slot: u16) -> Result<u32, SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        Ok(s.loot.client_take(container, slot, &mut s.outbox))
    }

    /// Split `count` off the stack at `slot`.
    pub fn split(
        &mut self,
        container: NetId,
        slot: u16,
        count: u16,
        dest_slot: Option<u16>,
    ) -> Result<u32, SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        Ok(s
            .loot
            .client_split(container, slot, count, dest_slot, &mut s.outbox))
    }

    /// Attach an item from the local inventory to a weapon in a container.
    pub fn plug_from_inventory(
        &mut self,
        container: NetId,
        weapon_slot: u16,
        slot_key: &str,
        inventory_slot: u16,
    ) -> Result<u32, SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        s.loot.client_plug_from_inventory(
            &mut s.ctx.world,
            container,
            weapon_slot,
            slot_key,
            inventory_slot,
            &mut s.outbox,
        )
    }

    /// Detach an item from a weapon into the local inventory.
    pub fn unplug(&mut self, container: NetId, weapon_slot: u16, slot_key: &str) -> Result<u32, SyncError> {
        self.require_host()?;
        let s = &mut self.session;
        Ok(s
            .loot
            .client_unplug(container, weapon_slot, slot_key, &mut s.outbox))
    }

    /// Items of a bound container as this side sees them.
    pub fn container_items(&self, container: NetId) -> Option<Vec<(u16, ItemTree)>> {
        let entity = self.session.loot.entity_of(container)?;
        Some(self.session.ctx.world.items(entity))
    }
}
