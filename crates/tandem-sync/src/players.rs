//! Participant registry and scene interest.
//!
//! Tracks every remote participant's [`PlayerStatus`], its transport handle
//! (host side) and the local replica standing in for it. Interest is a pure
//! function of scene affinity: a replica exists exactly while both sides are
//! in game and on the same map.

use std::collections::{BTreeMap, HashMap};

use tandem_net::messages::PlayerStatus;
use tandem_net::transport::PeerHandle;

use crate::clock::RttEstimator;
use crate::outbox::PeerDirectory;
use crate::scene::same_map;
use crate::world::{EntityRef, SpawnTicket};

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Lifecycle of a participant's local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    /// Spawn requested, waiting for the factory.
    Spawning(SpawnTicket),
    /// Replica exists.
    Live(EntityRef),
}

/// One remote participant.
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    /// Last reported status.
    pub status: PlayerStatus,
    /// Transport handle. Only the host knows its clients' handles.
    pub peer: Option<PeerHandle>,
    /// Local stand-in.
    pub replica: Option<ReplicaState>,
    /// Round trip estimate (host side).
    pub rtt: RttEstimator,
}

impl PlayerEntry {
    fn new(status: PlayerStatus, peer: Option<PeerHandle>) -> Self {
        Self {
            status,
            peer,
            replica: None,
            rtt: RttEstimator::default(),
        }
    }

    /// The live replica, if any.
    pub fn replica_entity(&self) -> Option<EntityRef> {
        match self.replica {
            Some(ReplicaState::Live(entity)) => Some(entity),
            _ => None,
        }
    }
}

/// Replica changes produced by [`PlayerRegistry::evaluate_interest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestTransitions {
    /// Endpoints that now share the local scene and have no replica.
    pub spawn: Vec<String>,
    /// Endpoints that no longer share the local scene but have a replica.
    pub despawn: Vec<String>,
}

impl InterestTransitions {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.spawn.is_empty() && self.despawn.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PlayerRegistry
// ---------------------------------------------------------------------------

/// All known remote participants, keyed by endpoint id.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<String, PlayerEntry>,
    by_peer: HashMap<PeerHandle, String>,
}

impl PlayerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a participant or refresh its status. Returns `true` when new.
    ///
    /// The registry's endpoint id wins over whatever the status claims.
    pub fn upsert(&mut self, endpoint_id: &str, mut status: PlayerStatus, peer: Option<PeerHandle>) -> bool {
        status.endpoint_id = endpoint_id.to_string();
        match self.players.get_mut(endpoint_id) {
            Some(entry) => {
                // Latency is measured here, not reported.
                if entry.peer.is_some() {
                    status.latency_ms = entry.status.latency_ms;
                }
                entry.status = status;
                if let Some(peer) = peer {
                    self.by_peer.insert(peer.clone(), endpoint_id.to_string());
                    entry.peer = Some(peer);
                }
                false
            }
            None => {
                if let Some(peer) = &peer {
                    self.by_peer.insert(peer.clone(), endpoint_id.to_string());
                }
                self.players
                    .insert(endpoint_id.to_string(), PlayerEntry::new(status, peer));
                true
            }
        }
    }

    /// Remove a participant.
    pub fn remove(&mut self, endpoint_id: &str) -> Option<PlayerEntry> {
        let entry = self.players.remove(endpoint_id)?;
        if let Some(peer) = &entry.peer {
            self.by_peer.remove(peer);
        }
        Some(entry)
    }

    /// Remove the participant behind a transport handle.
    pub fn remove_by_peer(&mut self, peer: &PeerHandle) -> Option<(String, PlayerEntry)> {
        let endpoint = self.by_peer.remove(peer)?;
        let entry = self.players.remove(&endpoint)?;
        Some((endpoint, entry))
    }

    /// Drop everything, returning the removed entries.
    pub fn clear(&mut self) -> Vec<(String, PlayerEntry)> {
        self.by_peer.clear();
        std::mem::take(&mut self.players).into_iter().collect()
    }

    /// Endpoint id registered for a transport handle.
    pub fn endpoint_of(&self, peer: &PeerHandle) -> Option<&str> {
        self.by_peer.get(peer).map(String::as_str)
    }

    /// Look up a participant.
    pub fn get(&self, endpoint_id: &str) -> Option<&PlayerEntry> {
        self.players.get(endpoint_id)
    }

    /// Mutable lookup.
    pub fn get_mut(&mut self, endpoint_id: &str) -> Option<&mut PlayerEntry> {
        self.players.get_mut(endpoint_id)
    }

    /// Whether a participant is known.
    pub fn contains(&self, endpoint_id: &str) -> bool {
        self.players.contains_key(endpoint_id)
    }

    /// Endpoint ids in sorted order.
    pub fn endpoints(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }

    /// Every known status, sorted by endpoint id.
    pub fn statuses(&self) -> Vec<PlayerStatus> {
        self.players.values().map(|e| e.status.clone()).collect()
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Live replica of a participant.
    pub fn replica_of(&self, endpoint_id: &str) -> Option<EntityRef> {
        self.players.get(endpoint_id)?.replica_entity()
    }

    /// Participant a live replica stands in for.
    pub fn owner_of_replica(&self, entity: EntityRef) -> Option<&str> {
        self.players
            .iter()
            .find(|(_, e)| e.replica_entity() == Some(entity))
            .map(|(id, _)| id.as_str())
    }

    /// Record a requested replica spawn.
    pub fn set_spawning(&mut self, endpoint_id: &str, ticket: SpawnTicket) {
        if let Some(entry) = self.players.get_mut(endpoint_id) {
            entry.replica = Some(ReplicaState::Spawning(ticket));
        }
    }

    /// Endpoint still waiting on `ticket`, if any.
    pub fn awaiting(&self, ticket: SpawnTicket) -> Option<&str> {
        self.players
            .iter()
            .find(|(_, e)| e.replica == Some(ReplicaState::Spawning(ticket)))
            .map(|(id, _)| id.as_str())
    }

    /// Mark a replica live.
    pub fn set_live(&mut self, endpoint_id: &str, entity: EntityRef) {
        if let Some(entry) = self.players.get_mut(endpoint_id) {
            entry.replica = Some(ReplicaState::Live(entity));
        }
    }

    /// Forget a replica, returning the live entity to destroy.
    pub fn take_replica(&mut self, endpoint_id: &str) -> Option<EntityRef> {
        let entry = self.players.get_mut(endpoint_id)?;
        match entry.replica.take() {
            Some(ReplicaState::Live(entity)) => Some(entity),
            _ => None,
        }
    }

    /// Whether a participant shares the given local scene.
    pub fn shares_scene(&self, endpoint_id: &str, local_scene: &str, local_in_game: bool) -> bool {
        self.players
            .get(endpoint_id)
            .is_some_and(|e| shares(&e.status, local_scene, local_in_game))
    }

    /// Replica spawns and despawns needed for the local scene.
    pub fn evaluate_interest(&self, local_scene: &str, local_in_game: bool) -> InterestTransitions {
        let mut transitions = InterestTransitions::default();
        for (endpoint, entry) in &self.players {
            let visible = shares(&entry.status, local_scene, local_in_game);
            match (visible, entry.replica.is_some()) {
                (true, false) => transitions.spawn.push(endpoint.clone()),
                (false, true) => transitions.despawn.push(endpoint.clone()),
                _ => {}
            }
        }
        transitions
    }
}

fn shares(status: &PlayerStatus, local_scene: &str, local_in_game: bool) -> bool {
    local_in_game && status.in_game && same_map(&status.scene_id, local_scene)
}

impl PeerDirectory for PlayerRegistry {
    fn peer_for(&self, endpoint_id: &str) -> Option<PeerHandle> {
        self.players.get(endpoint_id)?.peer.clone()
    }

    fn peers_sharing(&self, scene_id: &str) -> Vec<(String, PeerHandle)> {
        self.players
            .iter()
            .filter(|(_, e)| shares(&e.status, scene_id, true))
            .filter_map(|(id, e)| Some((id.clone(), e.peer.clone()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(scene: &str, in_game: bool) -> PlayerStatus {
        PlayerStatus {
            scene_id: scene.to_string(),
            in_game,
            ..Default::default()
        }
    }

    fn peer(id: &str) -> PeerHandle {
        PeerHandle::Session(id.to_string())
    }

    #[test]
    fn test_upsert_and_lookup_by_peer() {
        let mut players = PlayerRegistry::new();
        assert!(players.upsert("a", status("level_01", true), Some(peer("a"))));
        assert!(!players.upsert("a", status("level_02", true), None));
        assert_eq!(players.endpoint_of(&peer("a")), Some("a"));
        assert_eq!(players.get("a").unwrap().status.scene_id, "level_02");
        assert_eq!(players.get("a").unwrap().status.endpoint_id, "a");

        let (endpoint, _) = players.remove_by_peer(&peer("a")).unwrap();
        assert_eq!(endpoint, "a");
        assert!(players.is_empty());
        assert_eq!(players.endpoint_of(&peer("a")), None);
    }

    #[test]
    fn test_interest_transitions() {
        let mut players = PlayerRegistry::new();
        players.upsert("same", status("Level_01_Day", true), None);
        players.upsert("other", status("level_02", true), None);
        players.upsert("menu", status("level_01", false), None);

        let t = players.evaluate_interest("level-01", true);
        assert_eq!(t.spawn, vec!["same".to_string()]);
        assert!(t.despawn.is_empty());

        players.set_spawning("same", SpawnTicket(1));
        assert!(players.evaluate_interest("level-01", true).is_empty());

        // Leaving the scene despawns, even while the spawn is in flight.
        let t = players.evaluate_interest("base", true);
        assert_eq!(t.despawn, vec!["same".to_string()]);
    }

    #[test]
    fn test_not_in_game_sees_nobody() {
        let mut players = PlayerRegistry::new();
        players.upsert("a", status("level_01", true), None);
        assert!(players.evaluate_interest("level_01", false).spawn.is_empty());
    }

    #[test]
    fn test_replica_lifecycle() {
        let mut players = PlayerRegistry::new();
        players.upsert("a", status("level_01", true), None);
        players.set_spawning("a", SpawnTicket(9));
        assert_eq!(players.awaiting(SpawnTicket(9)), Some("a"));
        assert_eq!(players.replica_of("a"), None);

        let e = EntityRef { index: 3, generation: 1 };
        players.set_live("a", e);
        assert_eq!(players.replica_of("a"), Some(e));
        assert_eq!(players.owner_of_replica(e), Some("a"));
        assert_eq!(players.awaiting(SpawnTicket(9)), None);
        assert_eq!(players.take_replica("a"), Some(e));
        assert_eq!(players.replica_of("a"), None);
    }

    #[test]
    fn test_peers_sharing_skips_unconnected() {
        let mut players = PlayerRegistry::new();
        players.upsert("a", status("level_01", true), Some(peer("a")));
        players.upsert("b", status("level_01", true), None);
        players.upsert("c", status("base", true), Some(peer("c")));
        let sharing = players.peers_sharing("level_01_night");
        assert_eq!(sharing, vec![("a".to_string(), peer("a"))]);
    }
}
