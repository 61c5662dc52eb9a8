//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Local participant identity and role.
    pub session: SessionConfig,
    /// Transport settings.
    pub network: NetworkConfig,
    /// Synchronization windows, intervals and capacities.
    pub sync: SyncConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Which side of the session this process plays.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoleSetting {
    /// Authoritative participant.
    #[default]
    Host,
    /// Mirroring participant.
    Client,
}

/// Which transport backend to use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportKind {
    /// Connection-oriented TCP with LAN discovery.
    #[default]
    Tcp,
    /// Session-id addressed relay.
    Relay,
}

/// Local participant configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Host or client.
    pub role: RoleSetting,
    /// Stable endpoint identity. Empty means "derive from display name".
    pub endpoint_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Scene the local player starts in.
    pub scene_id: String,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Backend selection.
    pub transport: TransportKind,
    /// Host address clients connect to.
    pub host_address: String,
    /// Host TCP port.
    pub port: u16,
    /// UDP port used for LAN discovery beacons.
    pub discovery_port: u16,
    /// Maximum number of connected clients (host only).
    pub max_peers: u32,
    /// Single-packet ceiling for unreliable traffic in bytes.
    pub unreliable_packet_budget: u32,
    /// Single-packet ceiling for reliable traffic in bytes.
    pub reliable_packet_budget: u32,
    /// Simulation tick rate in Hz.
    pub tick_rate: u32,
}

/// Synchronization tuning. All durations are in milliseconds, distances in
/// metres.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Minimum spacing between health pushes for one entity.
    pub health_cooldown_ms: u64,
    /// How long after local self-damage a higher server value is an echo.
    pub echo_window_ms: u64,
    /// How long an applied server value mutes the local change listener.
    pub health_mute_ms: u64,
    /// Health applied when neither a report nor a live value exists.
    pub default_health: f32,
    /// Deferred "ensure health UI visible" attempts after binding.
    pub health_ui_retries: u32,
    /// Spacing between health UI attempts.
    pub health_ui_retry_interval_ms: u64,
    /// AI transform broadcast interval.
    pub ai_transform_interval_ms: u64,
    /// AI animation broadcast interval.
    pub ai_anim_interval_ms: u64,
    /// Fallback single-packet budget when the transport reports none.
    pub fallback_packet_budget: u32,
    /// Capacity of the queue holding updates for not-yet-known actors.
    pub unknown_actor_queue: usize,
    /// Queued updates drained per tick once the AI subsystem is ready.
    pub unknown_actor_drain_per_tick: usize,
    /// Radius for binding an unknown AI id to a nearby local actor.
    pub rebind_radius: f32,
    /// Minimum spacing between rebind attempts for one id.
    pub rebind_cooldown_ms: u64,
    /// Broadcast mute after server-side programmatic container mutation.
    pub loot_mute_ms: u64,
    /// Radius for matching an announced container to a local one.
    pub container_match_radius: f32,
    /// Player status / list broadcast interval.
    pub status_interval_ms: u64,
    /// Player position send interval.
    pub position_interval_ms: u64,
    /// Host ping interval.
    pub ping_interval_ms: u64,
    /// LAN discovery announce interval (connection-oriented backend only).
    pub discovery_interval_ms: u64,
}

impl SyncConfig {
    /// Health push cooldown.
    pub fn health_cooldown(&self) -> Duration {
        Duration::from_millis(self.health_cooldown_ms)
    }

    /// Echo acceptance window.
    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }

    /// Change-listener mute window.
    pub fn health_mute(&self) -> Duration {
        Duration::from_millis(self.health_mute_ms)
    }

    /// Spacing between health UI retries.
    pub fn health_ui_retry_interval(&self) -> Duration {
        Duration::from_millis(self.health_ui_retry_interval_ms)
    }

    /// AI transform broadcast interval.
    pub fn ai_transform_interval(&self) -> Duration {
        Duration::from_millis(self.ai_transform_interval_ms)
    }

    /// AI animation broadcast interval.
    pub fn ai_anim_interval(&self) -> Duration {
        Duration::from_millis(self.ai_anim_interval_ms)
    }

    /// Per-id rebind cooldown.
    pub fn rebind_cooldown(&self) -> Duration {
        Duration::from_millis(self.rebind_cooldown_ms)
    }

    /// Container broadcast mute window.
    pub fn loot_mute(&self) -> Duration {
        Duration::from_millis(self.loot_mute_ms)
    }

    /// Status broadcast interval.
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Position send interval.
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }

    /// Ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Discovery announce interval.
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to `log_dir`.
    pub file_logging: bool,
    /// Directory for JSON log files.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: RoleSetting::Host,
            endpoint_id: String::new(),
            display_name: "Player".to_string(),
            scene_id: "Base".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            host_address: "127.0.0.1".to_string(),
            port: 9050,
            discovery_port: 9051,
            max_peers: 8,
            unreliable_packet_budget: 1200,
            reliable_packet_budget: 64 * 1024,
            tick_rate: 60,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            health_cooldown_ms: 50,
            echo_window_ms: 400,
            health_mute_ms: 150,
            default_health: 40.0,
            health_ui_retries: 3,
            health_ui_retry_interval_ms: 250,
            ai_transform_interval_ms: 100,
            ai_anim_interval_ms: 100,
            fallback_packet_budget: 1200,
            unknown_actor_queue: 256,
            unknown_actor_drain_per_tick: 32,
            rebind_radius: 3.0,
            rebind_cooldown_ms: 1000,
            loot_mute_ms: 300,
            container_match_radius: 1.0,
            status_interval_ms: 500,
            position_interval_ms: 50,
            ping_interval_ms: 1000,
            discovery_interval_ms: 2000,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
            log_dir: None,
        }
    }
}

/// Platform config directory for Tandem (`<config_dir>/tandem`).
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|d| d.join("tandem"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Smallest packet budget that still fits a header and a useful payload.
const MIN_PACKET_BUDGET: u32 = 64;

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values that parse but would break a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        let net = &self.network;
        if net.tick_rate == 0 {
            return invalid("network.tick_rate", "must be at least 1 Hz");
        }
        if net.max_peers == 0 {
            return invalid("network.max_peers", "must allow at least one peer");
        }
        if net.unreliable_packet_budget < MIN_PACKET_BUDGET
            || net.reliable_packet_budget < MIN_PACKET_BUDGET
        {
            return invalid("network.*_packet_budget", "too small for a single message");
        }
        if net.port == net.discovery_port {
            return invalid("network.discovery_port", "collides with the session port");
        }

        let sync = &self.sync;
        if sync.fallback_packet_budget < MIN_PACKET_BUDGET {
            return invalid("sync.fallback_packet_budget", "too small for a single message");
        }
        if !(sync.default_health.is_finite() && sync.default_health > 0.0) {
            return invalid("sync.default_health", "must be a positive number");
        }
        for (field, radius) in [
            ("sync.rebind_radius", sync.rebind_radius),
            ("sync.container_match_radius", sync.container_match_radius),
        ] {
            if !(radius.is_finite() && radius >= 0.0) {
                return invalid(field, "must be a non-negative distance");
            }
        }
        if sync.unknown_actor_queue > 0 && sync.unknown_actor_drain_per_tick == 0 {
            return invalid("sync.unknown_actor_drain_per_tick", "queue would never drain");
        }
        Ok(())
    }

    /// The endpoint id to use, falling back to a slug of the display name.
    pub fn effective_endpoint_id(&self) -> String {
        if !self.session.endpoint_id.is_empty() {
            return self.session.endpoint_id.clone();
        }
        let slug: String = self
            .session
            .display_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        format!("{slug}@{}", self.network.port)
    }
}
