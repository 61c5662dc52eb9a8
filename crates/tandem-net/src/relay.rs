//! Session-addressed backend routed through a relay hub.
//!
//! A [`RelayHub`] stands in for a lobby service: one member hosts, the rest
//! join, and every packet travels host <-> member (star topology). Members are
//! addressed by session id strings, so peers appear as [`PeerHandle::Session`].
//! The hub is cheap to clone and safe to share between threads; each
//! [`RelayTransport`] only touches its own inbox during [`Transport::poll`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::transport::{Delivery, PeerHandle, Transport, TransportError, TransportEvent};

/// Per-class packet budgets of the relay service.
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Largest unreliable packet. Default: 1200 bytes.
    pub unreliable_budget: usize,
    /// Largest reliable packet. Default: 64 KiB.
    pub reliable_budget: usize,
    /// Members allowed besides the host. Default: 8.
    pub max_members: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            unreliable_budget: 1200,
            reliable_budget: 65_536,
            max_members: 8,
        }
    }
}

#[derive(Default)]
struct HubState {
    host: Option<String>,
    inboxes: HashMap<String, VecDeque<TransportEvent>>,
    /// Join order, host excluded.
    members: Vec<String>,
    dropped_unreliable: bool,
}

/// In-process relay connecting one host with its members.
#[derive(Clone)]
pub struct RelayHub {
    state: Arc<Mutex<HubState>>,
    config: RelayConfig,
}

impl RelayHub {
    /// Create an empty hub.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A panic while holding the lock leaves plain queues behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open the session as host.
    pub fn host(&self, session_id: impl Into<String>) -> Result<RelayTransport, TransportError> {
        let session_id = session_id.into();
        let mut state = self.lock();
        if state.host.is_some() {
            return Err(TransportError::Full(1));
        }
        state.host = Some(session_id.clone());
        state.inboxes.insert(session_id.clone(), VecDeque::new());
        tracing::info!("Relay session hosted by {session_id}");
        Ok(RelayTransport {
            hub: self.clone(),
            me: session_id,
            is_host: true,
            closed: false,
        })
    }

    /// Join the hosted session.
    pub fn join(&self, session_id: impl Into<String>) -> Result<RelayTransport, TransportError> {
        let session_id = session_id.into();
        let mut state = self.lock();
        let Some(host) = state.host.clone() else {
            return Err(TransportError::NoHost);
        };
        if state.members.len() >= self.config.max_members {
            return Err(TransportError::Full(self.config.max_members));
        }
        if state.inboxes.contains_key(&session_id) {
            return Err(TransportError::UnknownPeer(PeerHandle::Session(session_id)));
        }
        state.members.push(session_id.clone());
        let mut inbox = VecDeque::new();
        inbox.push_back(TransportEvent::Connected(PeerHandle::Session(host.clone())));
        state.inboxes.insert(session_id.clone(), inbox);
        if let Some(host_inbox) = state.inboxes.get_mut(&host) {
            host_inbox.push_back(TransportEvent::Connected(PeerHandle::Session(
                session_id.clone(),
            )));
        }
        tracing::info!("{session_id} joined relay session of {host}");
        Ok(RelayTransport {
            hub: self.clone(),
            me: session_id,
            is_host: false,
            closed: false,
        })
    }

    /// Forcibly remove a member, as the relay service does on timeout.
    pub fn kick(&self, session_id: &str) {
        let mut state = self.lock();
        remove_member(&mut state, session_id, true);
    }

    /// Drop every unreliable packet from now on (simulated loss).
    pub fn set_drop_unreliable(&self, drop: bool) {
        self.lock().dropped_unreliable = drop;
    }

    /// Number of joined members, host excluded.
    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }
}

/// Remove `session_id` from the session. A kicked member keeps its inbox so it
/// can still observe the disconnect.
fn remove_member(state: &mut HubState, session_id: &str, kicked: bool) {
    if state.host.as_deref() == Some(session_id) {
        // Host leaving closes the session for everyone.
        state.host = None;
        state.inboxes.remove(session_id);
        let gone = PeerHandle::Session(session_id.to_string());
        for inbox in state.inboxes.values_mut() {
            inbox.push_back(TransportEvent::Disconnected(gone.clone()));
        }
        state.members.clear();
        return;
    }
    let before = state.members.len();
    state.members.retain(|m| m != session_id);
    let was_member = state.members.len() != before;
    let host = state.host.clone();
    if kicked {
        if was_member
            && let Some(host) = &host
            && let Some(inbox) = state.inboxes.get_mut(session_id)
        {
            inbox.push_back(TransportEvent::Disconnected(PeerHandle::Session(host.clone())));
        }
    } else {
        state.inboxes.remove(session_id);
    }
    if !was_member {
        return;
    }
    if let Some(host) = host
        && let Some(inbox) = state.inboxes.get_mut(&host)
    {
        inbox.push_back(TransportEvent::Disconnected(PeerHandle::Session(
            session_id.to_string(),
        )));
    }
}

/// One participant's view of a [`RelayHub`].
pub struct RelayTransport {
    hub: RelayHub,
    me: String,
    is_host: bool,
    closed: bool,
}

impl RelayTransport {
    /// Own session id.
    pub fn session_id(&self) -> &str {
        &self.me
    }

    fn check(&self, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let max = self.budget(delivery);
        if bytes.len() > max {
            return Err(TransportError::PacketTooLarge {
                size: bytes.len(),
                max,
            });
        }
        Ok(())
    }

    fn budget(&self, delivery: Delivery) -> usize {
        match delivery {
            Delivery::Reliable => self.hub.config.reliable_budget,
            Delivery::Unreliable => self.hub.config.unreliable_budget,
        }
    }

    fn deliver(
        &self,
        state: &mut HubState,
        to: &str,
        bytes: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        if !self.is_host && !state.members.contains(&self.me) {
            return Err(TransportError::Closed);
        }
        if delivery == Delivery::Unreliable && state.dropped_unreliable {
            return Ok(());
        }
        let inbox = state
            .inboxes
            .get_mut(to)
            .ok_or_else(|| TransportError::UnknownPeer(PeerHandle::Session(to.to_string())))?;
        inbox.push_back(TransportEvent::Packet {
            from: PeerHandle::Session(self.me.clone()),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

impl Transport for RelayTransport {
    fn send(
        &mut self,
        peer: &PeerHandle,
        bytes: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        self.check(bytes, delivery)?;
        let PeerHandle::Session(to) = peer else {
            return Err(TransportError::UnknownPeer(peer.clone()));
        };
        let mut state = self.hub.lock();
        // Star topology: members only reach the host.
        if !self.is_host && state.host.as_deref() != Some(to.as_str()) {
            return Err(TransportError::UnknownPeer(peer.clone()));
        }
        self.deliver(&mut state, to, bytes, delivery)
    }

    fn broadcast(
        &mut self,
        bytes: &[u8],
        delivery: Delivery,
        except: Option<&PeerHandle>,
    ) -> Result<(), TransportError> {
        self.check(bytes, delivery)?;
        let mut state = self.hub.lock();
        let targets: Vec<String> = if self.is_host {
            state.members.clone()
        } else {
            state.host.iter().cloned().collect()
        };
        for to in targets {
            if except.is_some_and(|e| *e == PeerHandle::Session(to.clone())) {
                continue;
            }
            self.deliver(&mut state, &to, bytes, delivery)?;
        }
        Ok(())
    }

    fn send_to_host(&mut self, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        self.check(bytes, delivery)?;
        let mut state = self.hub.lock();
        let host = match &state.host {
            Some(h) if !self.is_host => h.clone(),
            _ => return Err(TransportError::NoHost),
        };
        self.deliver(&mut state, &host, bytes, delivery)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut state = self.hub.lock();
        match state.inboxes.get_mut(&self.me) {
            Some(inbox) => inbox.drain(..).collect(),
            None => Vec::new(),
        }
    }

    fn max_packet_size(&self, delivery: Delivery) -> Option<usize> {
        Some(self.budget(delivery))
    }

    fn peers(&self) -> Vec<PeerHandle> {
        let state = self.hub.lock();
        if self.is_host {
            state
                .members
                .iter()
                .map(|m| PeerHandle::Session(m.clone()))
                .collect()
        } else {
            state
                .host
                .iter()
                .map(|h| PeerHandle::Session(h.clone()))
                .collect()
        }
    }

    fn disconnect(&mut self, peer: &PeerHandle) {
        if !self.is_host {
            return;
        }
        if let PeerHandle::Session(id) = peer {
            let mut state = self.hub.lock();
            remove_member(&mut state, id, true);
        }
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.hub.lock();
        remove_member(&mut state, &self.me, false);
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
