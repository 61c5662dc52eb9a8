//! Tandem session core: host-authoritative replication of players, health,
//! AI actors, loot containers and buffs on top of `tandem-net`.
//!
//! The game is reached only through the [`world::GameWorld`] trait family;
//! [`memory::MemoryWorld`] implements it in memory for tests and the demo.

pub mod ai;
pub mod buff;
pub mod clock;
pub mod error;
mod handlers;
pub mod health;
pub mod ids;
pub mod loot;
pub mod memory;
pub mod node;
pub mod outbox;
pub mod pending;
pub mod players;
pub mod scene;
pub mod session;
pub mod snapshot;
pub mod world;

pub use clock::{Clock, ManualClock, RttEstimator, SystemClock};
pub use error::SyncError;
pub use health::{HealthKey, HealthSync};
pub use loot::{DenyReason, LootOp, LootSync};
pub use memory::MemoryWorld;
pub use node::{SyncNode, TickReport};
pub use outbox::{FlushStats, Outbox, Target};
pub use pending::Deferral;
pub use players::PlayerRegistry;
pub use session::{LocalIdentity, SessionContext};
pub use world::{
    AiAppearance, EntityRef, GameWorld, Health, PlayerAppearance, SpawnTicket, WorldEvent,
};
