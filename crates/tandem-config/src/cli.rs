//! Command-line argument parsing for Tandem.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::config::{RoleSetting, TransportKind};

/// Tandem command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Tandem co-op session")]
pub struct CliArgs {
    /// Join as a client instead of hosting.
    #[arg(long)]
    pub client: bool,

    /// Display name.
    #[arg(long)]
    pub name: Option<String>,

    /// Host address to connect to.
    #[arg(long)]
    pub host: Option<String>,

    /// Host port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Use the session relay backend instead of TCP.
    #[arg(long)]
    pub relay: bool,

    /// Starting scene id.
    #[arg(long)]
    pub scene: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if args.client {
            self.session.role = RoleSetting::Client;
        }
        if let Some(ref name) = args.name {
            self.session.display_name = name.clone();
        }
        if let Some(ref addr) = args.host {
            self.network.host_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if args.relay {
            self.network.transport = TransportKind::Relay;
        }
        if let Some(ref scene) = args.scene {
            self.session.scene_id = scene.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
