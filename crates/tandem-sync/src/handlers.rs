//! Protocol handlers, one per opcode, and their role-gated registration.

use tandem_net::item::ItemTree;
use tandem_net::messages::{
    AiHealth, AiSnapshotRequest, BuffTarget, ClientStatus, Message, Opcode, PROTOCOL_VERSION,
    PlayerList, PlayerStatus, Pong, SceneNudge, Welcome,
};
use tandem_net::routing::{Inbound, Role, RoleGate, Router};
use tandem_net::transport::{Delivery, PeerHandle};

use crate::error::SyncError;
use crate::health::{HealthKey, SelfHealthOutcome};
use crate::loot::LootRequest;
use crate::outbox::Target;
use crate::scene::same_map;
use crate::session::Session;
use crate::world::{GameWorld, Health};

/// Pull the expected payload out of an inbound message.
macro_rules! payload {
    ($inbound:expr, $variant:ident) => {
        match $inbound.message {
            Message::$variant(p) => p,
            other => return Err(SyncError::UnexpectedMessage(other.opcode())),
        }
    };
}

type Handler<W> = fn(&mut Session<W>, Inbound) -> Result<(), SyncError>;

/// Build the router for a role with every handler registered.
pub(crate) fn build_router<W: GameWorld + 'static>(role: Role) -> Router<Session<W>, SyncError> {
    let mut router = Router::new(role);
    let mut route = |opcode: Opcode, gate: RoleGate, handler: Handler<W>| router.register(opcode, gate, handler);

    // Session
    route(Opcode::ClientHello, RoleGate::HostOnly, on_client_hello);
    route(Opcode::Welcome, RoleGate::ClientOnly, on_welcome);
    route(Opcode::PlayerList, RoleGate::ClientOnly, on_player_list);
    route(Opcode::ClientStatus, RoleGate::HostOnly, on_client_status);
    route(Opcode::PlayerPosition, RoleGate::Both, on_player_position);
    route(Opcode::PlayerAnim, RoleGate::Both, on_player_anim);
    route(Opcode::PlayerLeft, RoleGate::ClientOnly, on_player_left);
    route(Opcode::SceneNudge, RoleGate::ClientOnly, on_scene_nudge);
    route(Opcode::Ping, RoleGate::ClientOnly, on_ping);
    route(Opcode::Pong, RoleGate::HostOnly, on_pong);
    // Health
    route(Opcode::HealthReport, RoleGate::HostOnly, on_health_report);
    route(Opcode::SelfHealth, RoleGate::ClientOnly, on_self_health);
    route(Opcode::RemoteHealth, RoleGate::ClientOnly, on_remote_health);
    route(Opcode::AiHealth, RoleGate::ClientOnly, on_ai_health);
    route(Opcode::AiDamage, RoleGate::HostOnly, on_ai_damage);
    // AI
    route(Opcode::AiLoadout, RoleGate::ClientOnly, on_ai_loadout);
    route(Opcode::AiTransforms, RoleGate::ClientOnly, on_ai_transforms);
    route(Opcode::AiAnimations, RoleGate::ClientOnly, on_ai_animations);
    route(Opcode::AiAttack, RoleGate::ClientOnly, on_ai_attack);
    route(Opcode::AiTransformBurst, RoleGate::ClientOnly, on_ai_burst);
    route(Opcode::AiDespawn, RoleGate::ClientOnly, on_ai_despawn);
    route(Opcode::AiSnapshotRequest, RoleGate::HostOnly, on_ai_snapshot_request);
    // Buffs
    route(Opcode::BuffApply, RoleGate::Both, on_buff_apply);
    // Loot, host side
    route(Opcode::LootOpenRequest, RoleGate::HostOnly, on_loot_open);
    route(Opcode::LootResyncRequest, RoleGate::HostOnly, on_loot_resync);
    route(Opcode::LootPutRequest, RoleGate::HostOnly, on_loot_request);
    route(Opcode::LootTakeRequest, RoleGate::HostOnly, on_loot_request);
    route(Opcode::LootSplitRequest, RoleGate::HostOnly, on_loot_request);
    route(Opcode::SlotPlugRequest, RoleGate::HostOnly, on_loot_request);
    route(Opcode::SlotUnplugRequest, RoleGate::HostOnly, on_loot_request);
    // Loot, client side
    route(Opcode::LootState, RoleGate::ClientOnly, on_loot_state);
    route(Opcode::LootPutOk, RoleGate::ClientOnly, on_loot_ack);
    route(Opcode::LootTakeOk, RoleGate::ClientOnly, on_loot_ack);
    route(Opcode::LootSplitOk, RoleGate::ClientOnly, on_loot_ack);
    route(Opcode::SlotPlugOk, RoleGate::ClientOnly, on_loot_ack);
    route(Opcode::SlotUnplugOk, RoleGate::ClientOnly, on_loot_ack);
    route(Opcode::LootDeny, RoleGate::ClientOnly, on_loot_deny);
    route(Opcode::LootContainerSpawned, RoleGate::ClientOnly, on_loot_container_spawned);

    router
}

/// Endpoint id of the client that sent a message (host side).
fn sender_endpoint<W>(s: &Session<W>, sender: &Option<PeerHandle>) -> Result<String, SyncError> {
    let Some(peer) = sender else {
        return Err(SyncError::UnknownSender("local".into()));
    };
    s.players
        .endpoint_of(peer)
        .map(str::to_string)
        .ok_or_else(|| SyncError::UnknownSender(peer.to_string()))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

fn on_client_hello<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let Some(peer) = inbound.sender.clone() else {
        return Err(SyncError::UnknownSender("local".into()));
    };
    let hello = payload!(inbound, ClientHello);

    if hello.protocol_version != PROTOCOL_VERSION {
        tracing::warn!(
            "{} speaks protocol {}, we speak {PROTOCOL_VERSION}; disconnecting",
            hello.endpoint_id,
            hello.protocol_version
        );
        s.ctx.transport.disconnect(&peer);
        return Ok(());
    }
    let duplicate = hello.endpoint_id == s.ctx.local.endpoint_id
        || s.players
            .get(&hello.endpoint_id)
            .is_some_and(|e| e.peer.as_ref() != Some(&peer));
    if duplicate {
        tracing::warn!("Endpoint id {} already in use; disconnecting {peer}", hello.endpoint_id);
        s.ctx.transport.disconnect(&peer);
        return Ok(());
    }

    let endpoint = hello.endpoint_id.clone();
    let status = PlayerStatus {
        endpoint_id: endpoint.clone(),
        display_name: hello.display_name,
        in_game: !hello.scene_id.is_empty(),
        scene_id: hello.scene_id,
        ..Default::default()
    };
    let scene_matches = same_map(&status.scene_id, &s.scene());
    s.players.upsert(&endpoint, status, Some(peer));
    tracing::info!("{endpoint} joined the session");

    let to = Target::Endpoint(endpoint.clone());
    if !scene_matches {
        s.outbox.push(
            to.clone(),
            SceneNudge {
                scene_id: s.scene(),
            },
        );
    }
    s.outbox.push(
        to,
        Welcome {
            host_endpoint: s.ctx.local.endpoint_id.clone(),
            statuses: s.all_statuses(),
        },
    );
    s.send_health_catchup(&endpoint);
    s.outbox.push(
        Target::Broadcast { except: None },
        PlayerList {
            statuses: s.all_statuses(),
        },
    );
    s.refresh_interest();
    Ok(())
}

/// Client: replace the peer list with what the host reported.
fn sync_player_list<W: GameWorld>(s: &mut Session<W>, statuses: Vec<PlayerStatus>) {
    let me = s.ctx.local.endpoint_id.clone();
    let listed: Vec<String> = statuses
        .iter()
        .map(|st| st.endpoint_id.clone())
        .filter(|e| *e != me)
        .collect();
    for endpoint in s.players.endpoints() {
        if !listed.contains(&endpoint) {
            s.remove_player(&endpoint);
        }
    }
    for status in statuses {
        if status.endpoint_id == me {
            continue;
        }
        let endpoint = status.endpoint_id.clone();
        s.players.upsert(&endpoint, status, None);
    }
    s.refresh_interest();
}

fn on_welcome<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let welcome = payload!(inbound, Welcome);
    tracing::info!("Welcomed by host {}", welcome.host_endpoint);
    s.host_endpoint = Some(welcome.host_endpoint);
    s.welcomed = true;
    sync_player_list(s, welcome.statuses);

    s.outbox.push(
        Target::Host,
        ClientStatus {
            status: s.local_status(),
        },
    );
    if s.ctx.world.in_game() {
        s.outbox.push(
            Target::Host,
            AiSnapshotRequest {
                scene_id: s.scene(),
            },
        );
    }
    Ok(())
}

fn on_player_list<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let list = payload!(inbound, PlayerList);
    sync_player_list(s, list.statuses);
    Ok(())
}

fn on_client_status<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let update = payload!(inbound, ClientStatus);
    s.players.upsert(&endpoint, update.status, None);
    s.refresh_interest();
    Ok(())
}

fn on_player_position<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let claimed = if s.is_host() {
        Some(sender_endpoint(s, &inbound.sender)?)
    } else {
        None
    };
    let mut position = payload!(inbound, PlayerPosition);
    if let Some(endpoint) = claimed {
        position.endpoint_id = endpoint;
    }
    let endpoint = position.endpoint_id.clone();
    if endpoint == s.ctx.local.endpoint_id {
        return Ok(());
    }

    let Some(entry) = s.players.get_mut(&endpoint) else {
        tracing::debug!("Position for unknown player {endpoint}");
        return Ok(());
    };
    entry.status.position = position.position;
    entry.status.facing = position.facing;
    let scene = entry.status.scene_id.clone();
    if let Some(replica) = entry.replica_entity() {
        s.ctx
            .world
            .set_transform(replica, position.position.to_vec3(), position.facing.to_dir());
    }
    if s.is_host() {
        s.outbox.push(
            Target::InScene {
                scene_id: scene,
                except: Some(endpoint),
            },
            position,
        );
    }
    Ok(())
}

fn on_player_anim<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let claimed = if s.is_host() {
        Some(sender_endpoint(s, &inbound.sender)?)
    } else {
        None
    };
    let mut anim = payload!(inbound, PlayerAnim);
    if let Some(endpoint) = claimed {
        anim.endpoint_id = endpoint;
    }
    let endpoint = anim.endpoint_id.clone();
    if endpoint == s.ctx.local.endpoint_id {
        return Ok(());
    }
    let Some(entry) = s.players.get(&endpoint) else {
        return Ok(());
    };
    let scene = entry.status.scene_id.clone();
    if let Some(replica) = entry.replica_entity() {
        s.ctx.world.set_animation(replica, anim.anim);
    }
    if s.is_host() {
        s.outbox.push(
            Target::InScene {
                scene_id: scene,
                except: Some(endpoint),
            },
            anim,
        );
    }
    Ok(())
}

fn on_player_left<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let left = payload!(inbound, PlayerLeft);
    tracing::info!("{} left the session", left.endpoint_id);
    s.remove_player(&left.endpoint_id);
    Ok(())
}

fn on_scene_nudge<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let nudge = payload!(inbound, SceneNudge);
    if same_map(&nudge.scene_id, &s.scene()) {
        return Ok(());
    }
    tracing::info!("Host asks us to move to '{}'", nudge.scene_id);
    s.ctx.world.request_scene_change(&nudge.scene_id);
    Ok(())
}

fn on_ping<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let ping = payload!(inbound, Ping);
    s.outbox.push(Target::Host, Pong { seq: ping.seq });
    Ok(())
}

fn on_pong<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let pong = payload!(inbound, Pong);
    let now = s.now();
    s.record_pong(&endpoint, pong.seq, now);
    Ok(())
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

fn on_health_report<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let report = payload!(inbound, HealthReport);
    let replica = s.players.replica_of(&endpoint);
    s.health.apply_snapshot(
        &mut s.ctx.world,
        HealthKey::Player(endpoint),
        Health::new(report.max, report.current),
        replica,
    );
    Ok(())
}

fn on_self_health<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let update = payload!(inbound, SelfHealth);
    let now = s.now();
    let outcome =
        s.health
            .on_self_health(&mut s.ctx.world, Health::new(update.max, update.current), now);
    if outcome == SelfHealthOutcome::NoPlayer {
        tracing::debug!("Self health {}/{} with no local player", update.current, update.max);
    }
    Ok(())
}

fn on_remote_health<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let update = payload!(inbound, RemoteHealth);
    if update.endpoint_id == s.ctx.local.endpoint_id {
        return Ok(());
    }
    let replica = s.players.replica_of(&update.endpoint_id);
    s.health.apply_snapshot(
        &mut s.ctx.world,
        HealthKey::Player(update.endpoint_id),
        Health::new(update.max, update.current),
        replica,
    );
    Ok(())
}

fn on_ai_health<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let update = payload!(inbound, AiHealth);
    let entity = s.ai.entity_of(update.id);
    s.health.apply_snapshot(
        &mut s.ctx.world,
        HealthKey::Ai(update.id),
        Health::new(update.max, update.current),
        entity,
    );
    Ok(())
}

fn on_ai_damage<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let damage = payload!(inbound, AiDamage);
    match s.ai.entity_of(damage.id) {
        Some(entity) => {
            tracing::trace!("{endpoint} hit AI {} for {}", damage.id, damage.amount);
            s.ctx.world.apply_damage(entity, damage.amount);
        }
        None => tracing::debug!("{endpoint} hit unknown AI {}", damage.id),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

fn on_ai_loadout<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let loadout = payload!(inbound, AiLoadout);
    let now = s.now();
    if let Some((id, entity)) = s.ai.on_loadout(&mut s.ctx.world, loadout) {
        s.bind_ai_mirror(id, entity, now);
    }
    Ok(())
}

fn on_ai_transforms<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let batch = payload!(inbound, AiTransforms);
    let now = s.now();
    let bound = s.ai.on_transforms(&mut s.ctx.world, batch.entries, now);
    s.bind_ai_mirrors(bound, now);
    Ok(())
}

fn on_ai_animations<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let batch = payload!(inbound, AiAnimations);
    s.ai.on_animations(&mut s.ctx.world, batch.entries);
    Ok(())
}

fn on_ai_attack<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let attack = payload!(inbound, AiAttack);
    s.ai.on_attack(&mut s.ctx.world, attack.id, attack.weapon_slot);
    Ok(())
}

fn on_ai_burst<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let burst = payload!(inbound, AiTransformBurst);
    let now = s.now();
    let bound = s.ai.on_burst(&mut s.ctx.world, burst.entries, now);
    s.bind_ai_mirrors(bound, now);
    Ok(())
}

fn on_ai_despawn<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let despawn = payload!(inbound, AiDespawn);
    if let Some(entity) = s.ai.on_despawn(&mut s.ctx.world, despawn.id) {
        s.health.unbind(&mut s.ctx.world, entity);
    }
    s.health.drop_pending(&HealthKey::Ai(despawn.id));
    s.buffs
        .drop_target(&BuffTarget::Ai(despawn.id));
    Ok(())
}

fn on_ai_snapshot_request<W: GameWorld>(
    s: &mut Session<W>,
    inbound: Inbound,
) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let request = payload!(inbound, AiSnapshotRequest);
    if !same_map(&request.scene_id, &s.scene()) {
        tracing::debug!("{endpoint} asked for AI of '{}', not our scene", request.scene_id);
        return Ok(());
    }
    let budget = s.budget(Delivery::Reliable);
    s.ai
        .host_snapshot(&s.ctx.world, &endpoint, budget, &mut s.outbox);
    for (id, entity) in s.ai.bound() {
        if let Some(h) = s.ctx.world.health(entity) {
            s.outbox.push(
                Target::Endpoint(endpoint.clone()),
                AiHealth {
                    id,
                    max: h.max,
                    current: h.current,
                },
            );
        }
    }
    s.loot.host_announce_all(&s.ctx.world, &endpoint, &mut s.outbox);
    Ok(())
}

// ---------------------------------------------------------------------------
// Buffs
// ---------------------------------------------------------------------------

fn on_buff_apply<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let relay_from = if s.is_host() {
        Some(sender_endpoint(s, &inbound.sender)?)
    } else {
        None
    };
    let apply = payload!(inbound, BuffApply);
    let now = s.now();
    let entity = s.buff_entity(&apply.target);
    s.buffs.apply(
        &mut s.ctx.world,
        apply.target.clone(),
        apply.buff_id,
        apply.duration,
        entity,
        now,
    );
    if let Some(endpoint) = relay_from {
        s.outbox.push(
            Target::Broadcast {
                except: Some(endpoint),
            },
            apply,
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Loot
// ---------------------------------------------------------------------------

fn on_loot_open<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let request = payload!(inbound, LootOpenRequest);
    s.loot.host_open(&s.ctx.world, &endpoint, request, &mut s.outbox);
    Ok(())
}

fn on_loot_resync<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let request = payload!(inbound, LootResyncRequest);
    s.loot
        .host_resync(&s.ctx.world, &endpoint, request, &mut s.outbox);
    Ok(())
}

fn on_loot_request<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let endpoint = sender_endpoint(s, &inbound.sender)?;
    let request = match inbound.message {
        Message::LootPutRequest(r) => LootRequest::Put(r),
        Message::LootTakeRequest(r) => LootRequest::Take(r),
        Message::LootSplitRequest(r) => LootRequest::Split(r),
        Message::SlotPlugRequest(r) => LootRequest::Plug(r),
        Message::SlotUnplugRequest(r) => LootRequest::Unplug(r),
        other => return Err(SyncError::UnexpectedMessage(other.opcode())),
    };
    let scene = s.scene();
    // Denies are answered inside; the outcome is already logged.
    let _ = s
        .loot
        .host_handle(&mut s.ctx.world, &endpoint, request, &scene, &mut s.outbox);
    Ok(())
}

fn on_loot_state<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let state = payload!(inbound, LootState);
    s.loot.on_state(&mut s.ctx.world, state);
    Ok(())
}

fn on_loot_ack<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let (token, received): (u32, Option<ItemTree>) = match inbound.message {
        Message::LootPutOk(ok) => (ok.token, None),
        Message::LootTakeOk(ok) => (ok.token, Some(ok.item)),
        Message::LootSplitOk(ok) => (ok.token, None),
        Message::SlotPlugOk(ok) => (ok.token, None),
        Message::SlotUnplugOk(ok) => (ok.token, Some(ok.item)),
        other => return Err(SyncError::UnexpectedMessage(other.opcode())),
    };
    s.loot.on_ack(&mut s.ctx.world, token, received);
    Ok(())
}

fn on_loot_deny<W: GameWorld>(s: &mut Session<W>, inbound: Inbound) -> Result<(), SyncError> {
    let deny = payload!(inbound, LootDeny);
    s.loot.on_deny(&mut s.ctx.world, &deny, &mut s.outbox);
    Ok(())
}

fn on_loot_container_spawned<W: GameWorld>(
    s: &mut Session<W>,
    inbound: Inbound,
) -> Result<(), SyncError> {
    let spawned = payload!(inbound, LootContainerSpawned);
    s.loot.on_container_spawned(&mut s.ctx.world, spawned);
    Ok(())
}
