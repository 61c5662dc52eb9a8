//! Host and clients talking through the in-process relay, driven by a shared
//! manual clock.

use std::time::Duration;

use glam::Vec3;
use tandem_config::SyncConfig;
use tandem_net::messages::{BuffTarget, NetId, RemoteHealth, SelfHealth};
use tandem_net::{
    DispatchOutcome, ItemTree, Message, RelayConfig, RelayHub, Role, Transport, encode_message,
};
use tandem_sync::world::{EntityFactory, HealthAccess, InventoryAccess, SceneAccess};
use tandem_sync::{
    AiAppearance, Health, HealthKey, LocalIdentity, ManualClock, MemoryWorld, SessionContext,
    SyncNode,
};

const TICK: Duration = Duration::from_millis(20);
const SCENE: &str = "Level_01_Main";
const FULL: Health = Health::new(100.0, 100.0);

fn world_with_player(scene: &str) -> MemoryWorld {
    let mut world = MemoryWorld::new(scene);
    world.spawn_local_player(Vec3::ZERO, FULL, 8);
    world
}

fn node(
    role: Role,
    endpoint: &str,
    transport: Box<dyn Transport>,
    world: MemoryWorld,
    clock: &ManualClock,
) -> SyncNode<MemoryWorld> {
    let local = LocalIdentity {
        endpoint_id: endpoint.to_string(),
        display_name: endpoint.to_uppercase(),
    };
    let ctx = SessionContext::new(role, SyncConfig::default(), transport, world, local)
        .with_clock(clock.clone());
    SyncNode::init(ctx)
}

fn inject(node: &mut SyncNode<MemoryWorld>, message: impl Into<Message>) {
    let bytes = encode_message(&message.into()).unwrap();
    assert_eq!(node.dispatch(None, bytes), DispatchOutcome::Handled);
}

struct Cluster {
    clock: ManualClock,
    hub: RelayHub,
    host: SyncNode<MemoryWorld>,
    clients: Vec<SyncNode<MemoryWorld>>,
}

impl Cluster {
    fn new(world: MemoryWorld) -> Self {
        let clock = ManualClock::new();
        let hub = RelayHub::new(RelayConfig::default());
        let transport = hub.host("host").unwrap();
        let host = node(Role::Host, "host", Box::new(transport), world, &clock);
        Self {
            clock,
            hub,
            host,
            clients: Vec::new(),
        }
    }

    fn join(&mut self, endpoint: &str, world: MemoryWorld) -> usize {
        let transport = self.hub.join(endpoint).unwrap();
        let client = node(Role::Client, endpoint, Box::new(transport), world, &self.clock);
        self.clients.push(client);
        self.clients.len() - 1
    }

    fn step(&mut self) {
        self.host.tick();
        for client in &mut self.clients {
            client.tick();
        }
        self.clock.advance(TICK);
    }

    fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }
}

/// Host plus one joined client `c1`, both in [`SCENE`].
fn joined_pair(client_world: MemoryWorld) -> Cluster {
    let mut cluster = Cluster::new(world_with_player(SCENE));
    cluster.join("c1", client_world);
    cluster.run(5);
    cluster
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[test]
fn test_join_spawns_replicas_on_both_sides() {
    let mut cluster = Cluster::new(world_with_player(SCENE));
    let c = cluster.join("c1", world_with_player("level-01"));
    cluster.run(5);

    let client = &cluster.clients[c];
    assert!(client.is_joined());
    assert_eq!(client.host_endpoint(), Some("host"));

    let on_host = cluster.host.players().replica_of("c1").unwrap();
    let on_client = client.players().replica_of("host").unwrap();
    assert_eq!(cluster.host.world().replicas(), vec![("c1".to_string(), on_host)]);
    assert_eq!(client.world().replicas(), vec![("host".to_string(), on_client)]);

    // The client's join report wins over the default.
    assert_eq!(cluster.host.world().health(on_host), Some(FULL));
    assert_eq!(client.world().health(on_client), Some(FULL));
    assert_eq!(cluster.host.router_stats().dropped(), 0);
    assert_eq!(client.router_stats().dropped(), 0);
}

#[test]
fn test_client_in_other_scene_is_nudged() {
    let mut cluster = Cluster::new(world_with_player(SCENE));
    let c = cluster.join("c1", world_with_player("Base"));
    cluster.run(4);

    assert_eq!(
        cluster.clients[c].world().scene_requests().to_vec(),
        vec![SCENE.to_string()]
    );
    assert!(cluster.host.players().replica_of("c1").is_none());
    assert!(cluster.clients[c].players().replica_of("host").is_none());

    cluster.clients[c].world_mut().change_scene(SCENE);
    cluster.run(4);
    assert!(cluster.host.players().replica_of("c1").is_some());
    assert!(cluster.clients[c].players().replica_of("host").is_some());
}

#[test]
fn test_client_leaving_removes_its_replica() {
    let mut cluster = joined_pair(world_with_player(SCENE));
    assert_eq!(cluster.host.world().replicas().len(), 1);

    let mut gone = cluster.clients.remove(0);
    gone.shutdown();
    cluster.run(2);

    assert!(cluster.host.players().is_empty());
    assert!(cluster.host.world().replicas().is_empty());
}

#[test]
fn test_kicked_client_tears_down() {
    let mut cluster = joined_pair(world_with_player(SCENE));
    let replica = cluster.clients[0].players().replica_of("host").unwrap();

    cluster.hub.kick("c1");
    cluster.run(1);

    let client = &cluster.clients[0];
    assert!(!client.is_joined());
    assert!(client.players().is_empty());
    assert!(!client.world().is_alive(replica));
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[test]
fn test_invalid_snapshot_parks_until_valid_value() {
    let mut cluster = joined_pair(world_with_player(SCENE));
    let client = &mut cluster.clients[0];
    let replica = client.players().replica_of("host").unwrap();
    let key = HealthKey::Player("host".to_string());

    inject(
        client,
        RemoteHealth {
            endpoint_id: "host".to_string(),
            max: 0.0,
            current: 0.0,
        },
    );
    assert_eq!(client.health().pending(&key), Some(Health::new(0.0, 0.0)));
    assert_eq!(client.world().health(replica), Some(FULL));

    inject(
        client,
        RemoteHealth {
            endpoint_id: "host".to_string(),
            max: 40.0,
            current: 40.0,
        },
    );
    assert_eq!(client.health().pending(&key), None);
    assert_eq!(client.world().health(replica), Some(Health::new(40.0, 40.0)));
}

#[test]
fn test_stale_echo_after_self_damage_is_dropped() {
    let mut cluster = joined_pair(world_with_player(SCENE));
    let player = cluster.clients[0].world().local_player().unwrap();

    cluster.clients[0].world_mut().damage_local_player(90.0);
    cluster.step();
    inject(
        &mut cluster.clients[0],
        SelfHealth {
            max: 100.0,
            current: 40.0,
        },
    );
    let damaged = Health::new(100.0, 10.0);
    assert_eq!(cluster.clients[0].world().health(player), Some(damaged));

    // The host takes the report and echoes the same value back.
    cluster.run(4);
    let replica = cluster.host.players().replica_of("c1").unwrap();
    assert_eq!(cluster.host.world().health(replica), Some(damaged));
    assert_eq!(cluster.clients[0].world().health(player), Some(damaged));
}

#[test]
fn test_health_survives_leaving_and_rejoining_scene() {
    let mut cluster = joined_pair(world_with_player(SCENE));
    let player = cluster.clients[0].world().local_player().unwrap();
    let hurt = Health::new(100.0, 70.0);

    cluster.clients[0].world_mut().damage_local_player(30.0);
    cluster.run(4);
    let replica = cluster.host.players().replica_of("c1").unwrap();
    assert_eq!(cluster.host.world().health(replica), Some(hurt));

    cluster.clients[0].world_mut().change_scene("Swamp");
    cluster.run(6);
    assert!(cluster.host.players().replica_of("c1").is_none());
    assert_eq!(
        cluster.host.health().pending(&HealthKey::Player("c1".to_string())),
        Some(hurt)
    );

    cluster.clients[0].world_mut().change_scene(SCENE);
    cluster.run(6);

    let replica = cluster.host.players().replica_of("c1").unwrap();
    let mirror = cluster.clients[0].players().replica_of("host").unwrap();
    assert_eq!(cluster.host.world().health(replica), Some(hurt));
    assert_eq!(cluster.clients[0].world().health(player), Some(hurt));
    assert_eq!(cluster.clients[0].world().health(mirror), Some(FULL));
}

// ---------------------------------------------------------------------------
// AI
// ---------------------------------------------------------------------------

#[test]
fn test_ai_actor_is_mirrored_then_despawned() {
    let appearance = AiAppearance {
        model_key: "scav_heavy".to_string(),
        weapons: vec![12, 40],
        face: vec![1, 2, 3],
    };
    let mut host_world = world_with_player(SCENE);
    let actor = host_world.place_ai(
        appearance.clone(),
        Vec3::new(5.0, 0.0, 5.0),
        Health::new(80.0, 80.0),
    );
    let mut cluster = Cluster::new(host_world);
    assert_eq!(cluster.host.ai().registered(), 1);
    let id = cluster.host.ai().id_of(actor).unwrap();

    cluster.join("c1", world_with_player(SCENE));
    cluster.run(6);

    let client = &cluster.clients[0];
    assert!(client.ai().is_ready());
    let mirror = client.ai().entity_of(id).unwrap();
    assert_eq!(
        client.world().entity(mirror).and_then(|e| e.appearance.clone()),
        Some(appearance)
    );
    assert_eq!(client.world().health(mirror), Some(Health::new(80.0, 80.0)));

    cluster.host.world_mut().kill(actor);
    cluster.run(3);
    let client = &cluster.clients[0];
    assert!(client.ai().entity_of(id).is_none());
    assert!(!client.world().is_alive(mirror));
}

// ---------------------------------------------------------------------------
// Buffs
// ---------------------------------------------------------------------------

#[test]
fn test_buff_on_client_player_reaches_its_owner() {
    let mut cluster = joined_pair(world_with_player(SCENE));
    cluster
        .host
        .apply_buff(BuffTarget::Player("c1".to_string()), 9, 30.0);
    cluster.run(2);

    let replica = cluster.host.players().replica_of("c1").unwrap();
    assert_eq!(
        cluster.host.world().entity(replica).map(|e| e.buffs.clone()),
        Some(vec![(9, 30.0)])
    );
    let client = &cluster.clients[0];
    let player = client.world().local_player().unwrap();
    assert_eq!(
        client.world().entity(player).map(|e| e.buffs.clone()),
        Some(vec![(9, 30.0)])
    );
}

// ---------------------------------------------------------------------------
// Loot
// ---------------------------------------------------------------------------

fn client_with_item() -> MemoryWorld {
    let mut world = world_with_player(SCENE);
    let inventory = world.local_inventory().unwrap();
    world
        .add_item(inventory, Some(0), ItemTree::simple(7, 1))
        .unwrap();
    world
}

#[test]
fn test_put_is_acked_and_broadcast() {
    let mut cluster = joined_pair(client_with_item());
    let container = cluster.host.world_mut().spawn_lootbox(
        None,
        Vec3::new(2.0, 0.0, 1.0),
        4,
        vec![ItemTree::simple(100, 3)],
    );
    cluster.run(3);

    let id = cluster.host.loot().id_of(container).unwrap();
    assert_eq!(
        cluster.clients[0].container_items(id).map(|items| items.len()),
        Some(1)
    );

    let token = cluster.clients[0].put_from_inventory(id, 0, None).unwrap();
    assert_ne!(token, 0);
    assert_eq!(cluster.clients[0].loot().in_flight(), 1);
    cluster.run(3);

    let client = &cluster.clients[0];
    assert_eq!(client.loot().in_flight(), 0);
    let inventory = client.world().local_inventory().unwrap();
    assert!(client.world().item_at(inventory, 0).is_none());

    let on_host = cluster.host.container_items(id).unwrap();
    assert!(on_host.iter().any(|(_, item)| item.type_id == 7));
    assert_eq!(client.container_items(id), Some(on_host));
}

#[test]
fn test_put_into_unknown_container_is_denied_and_restored() {
    let mut cluster = joined_pair(client_with_item());
    let client = &mut cluster.clients[0];
    let inventory = client.world().local_inventory().unwrap();

    client.put_from_inventory(NetId(4242), 0, None).unwrap();
    assert!(client.world().item_at(inventory, 0).is_none());
    cluster.run(3);

    let client = &cluster.clients[0];
    assert_eq!(client.loot().in_flight(), 0);
    assert_eq!(
        client.world().item_at(inventory, 0),
        Some(ItemTree::simple(7, 1))
    );
    assert_eq!(cluster.host.router_stats().failed, 0);
}

#[test]
fn test_late_joiner_sees_existing_containers() {
    let mut cluster = Cluster::new(world_with_player(SCENE));
    let container = cluster.host.world_mut().spawn_lootbox(
        None,
        Vec3::new(-3.0, 0.0, 0.0),
        2,
        vec![ItemTree::simple(55, 1)],
    );
    cluster.run(2);
    let id = cluster.host.loot().id_of(container).unwrap();

    cluster.join("c1", world_with_player(SCENE));
    cluster.run(6);

    let items = cluster.clients[0].container_items(id).unwrap();
    assert_eq!(items, vec![(0, ItemTree::simple(55, 1))]);
}
