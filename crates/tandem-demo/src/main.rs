//! Headless Tandem participant.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tandem-demo` to host over TCP, and
//! `cargo run -p tandem-demo -- --client --host 127.0.0.1` to join it.
//! With `--relay` a host and two clients share one process through the
//! in-memory relay.

mod activity;

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use glam::Vec3;
use tandem_config::{CliArgs, Config, RoleSetting, TransportKind, default_config_dir};
use tandem_net::discovery::scan_for_hosts;
use tandem_net::relay::{RelayConfig, RelayHub};
use tandem_net::routing::Role;
use tandem_net::tcp::{TcpConfig, TcpTransport};
use tandem_net::transport::{Transport, TransportError};
use tandem_sync::{Health, LocalIdentity, MemoryWorld, SessionContext, SyncNode};
use tracing::info;

use crate::activity::Activity;

/// How long the in-process relay session runs.
const RELAY_RUN: Duration = Duration::from_secs(30);
const REPORT_EVERY: Duration = Duration::from_secs(5);
const SCAN_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("discovery: {0}")]
    Discovery(#[from] std::io::Error),
    #[error("bad host address: {0}")]
    Address(#[from] AddrParseError),
    #[error("no host answered on the discovery port")]
    NoHostFound,
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(|| default_config_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config
        .debug
        .log_dir
        .clone()
        .unwrap_or_else(|| config_dir.join("logs"));
    tandem_log::init_logging(Some(&log_dir), config.debug.file_logging, Some(&config));

    let result = match config.network.transport {
        TransportKind::Tcp => run_tcp(&config),
        TransportKind::Relay => run_relay(&config),
    };
    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn tick_period(config: &Config) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(config.network.tick_rate.max(1)))
}

fn world_for(config: &Config) -> MemoryWorld {
    let mut world = MemoryWorld::new(&config.session.scene_id);
    world.spawn_local_player(Vec3::ZERO, Health::new(100.0, 100.0), 12);
    world
}

fn start_node(
    config: &Config,
    role: Role,
    local: LocalIdentity,
    transport: Box<dyn Transport>,
) -> SyncNode<MemoryWorld> {
    let ctx = SessionContext::new(
        role,
        config.sync.clone(),
        transport,
        world_for(config),
        local,
    );
    SyncNode::init(ctx)
}

fn tcp_config(config: &Config, announce: bool) -> TcpConfig {
    let net = &config.network;
    TcpConfig {
        max_peers: net.max_peers as usize,
        unreliable_budget: net.unreliable_packet_budget as usize,
        reliable_budget: net.reliable_packet_budget as usize,
        discovery_port: announce.then_some(net.discovery_port),
    }
}

/// Host address from config, or the first host found by LAN discovery.
fn resolve_host(config: &Config) -> Result<SocketAddr, DemoError> {
    let net = &config.network;
    if !net.host_address.is_empty() {
        let ip: IpAddr = net.host_address.parse()?;
        return Ok(SocketAddr::new(ip, net.port));
    }
    info!("Scanning for hosts on UDP {}", net.discovery_port);
    let hosts = scan_for_hosts(net.discovery_port, SCAN_WINDOW)?;
    let (addr, beacon) = hosts.into_iter().next().ok_or(DemoError::NoHostFound)?;
    info!(
        "Found {} in '{}' ({} players)",
        beacon.host_name, beacon.scene_id, beacon.players
    );
    Ok(SocketAddr::new(addr.ip(), beacon.port))
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

fn report(label: &str, node: &SyncNode<MemoryWorld>) {
    let stats = node.router_stats();
    info!(
        "[{label}] players={} ai={} health_bindings={} loot_in_flight={} handled={} dropped={}",
        node.players().len(),
        node.ai().registered(),
        node.health().bound_count(),
        node.loot().in_flight(),
        stats.handled,
        stats.dropped(),
    );
}

fn run_tcp(config: &Config) -> Result<(), DemoError> {
    let role = match config.session.role {
        RoleSetting::Host => Role::Host,
        RoleSetting::Client => Role::Client,
    };
    let transport: Box<dyn Transport> = match role {
        Role::Host => {
            let bind = SocketAddr::from(([0, 0, 0, 0], config.network.port));
            Box::new(TcpTransport::listen(bind, tcp_config(config, true))?)
        }
        Role::Client => Box::new(TcpTransport::connect(
            resolve_host(config)?,
            tcp_config(config, false),
        )?),
    };
    let local = LocalIdentity {
        endpoint_id: config.effective_endpoint_id(),
        display_name: config.session.display_name.clone(),
    };
    let mut node = start_node(config, role, local, transport);
    let mut activity = Activity::new(role, if role == Role::Host { 3.0 } else { 5.0 });

    let period = tick_period(config);
    let mut next_report = Instant::now() + REPORT_EVERY;
    let mut was_joined = false;
    loop {
        let started = Instant::now();
        node.tick();
        activity.step(&mut node, period);

        let joined = node.is_joined();
        if was_joined && !joined {
            info!("Session ended by host");
            break;
        }
        was_joined = joined;

        if started >= next_report {
            next_report = started + REPORT_EVERY;
            report(&config.session.display_name, &node);
        }
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }
    node.shutdown();
    Ok(())
}

fn run_relay(config: &Config) -> Result<(), DemoError> {
    let net = &config.network;
    let hub = RelayHub::new(RelayConfig {
        unreliable_budget: net.unreliable_packet_budget as usize,
        reliable_budget: net.reliable_packet_budget as usize,
        max_members: net.max_peers as usize,
    });

    let mut nodes = Vec::new();
    let host_id = config.effective_endpoint_id();
    let host = start_node(
        config,
        Role::Host,
        LocalIdentity {
            endpoint_id: host_id.clone(),
            display_name: config.session.display_name.clone(),
        },
        Box::new(hub.host(host_id)?),
    );
    nodes.push(("host".to_string(), host, Activity::new(Role::Host, 3.0)));
    for (i, name) in ["Ada", "Bo"].into_iter().enumerate() {
        let endpoint_id = format!("{}-relay", name.to_lowercase());
        let client = start_node(
            config,
            Role::Client,
            LocalIdentity {
                endpoint_id: endpoint_id.clone(),
                display_name: name.to_string(),
            },
            Box::new(hub.join(endpoint_id)?),
        );
        let radius = 5.0 + 2.0 * i as f32;
        nodes.push((name.to_string(), client, Activity::new(Role::Client, radius)));
    }

    let period = tick_period(config);
    let deadline = Instant::now() + RELAY_RUN;
    let mut next_report = Instant::now() + REPORT_EVERY;
    info!("Relay session running for {}s", RELAY_RUN.as_secs());
    while Instant::now() < deadline {
        let started = Instant::now();
        for (_, node, activity) in &mut nodes {
            node.tick();
            activity.step(node, period);
        }
        if started >= next_report {
            next_report = started + REPORT_EVERY;
            for (label, node, _) in &nodes {
                report(label, node);
            }
        }
        if let Some(rest) = period.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    // Clients leave first so the host sees them go.
    for (label, node, _) in nodes.iter_mut().rev() {
        node.shutdown();
        report(label, node);
    }
    Ok(())
}
