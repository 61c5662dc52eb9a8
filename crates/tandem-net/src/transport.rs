//! Transport abstraction shared by the TCP and relay backends.
//!
//! The sync core only talks to [`Transport`]. Both backends are poll-driven:
//! inbound traffic and connection changes accumulate internally and are
//! handed out by [`Transport::poll`] on the tick thread.

use std::fmt;

/// Fallback single-packet budget when a backend reports none.
pub const DEFAULT_PACKET_BUDGET: usize = 1200;

/// Unique identifier for a connection on the connection-oriented backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Opaque handle to a remote participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerHandle {
    /// A TCP connection.
    Connection(ConnectionId),
    /// A relay session member, addressed by session id.
    Session(String),
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerHandle::Connection(id) => write!(f, "{id}"),
            PeerHandle::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// Delivery class requested for a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Ordered, guaranteed per sender.
    Reliable,
    /// May be dropped. Used for high-rate state that is superseded quickly.
    Unreliable,
}

impl Delivery {
    /// Wire representation used by the framing layer.
    pub fn as_u8(self) -> u8 {
        match self {
            Delivery::Reliable => 0,
            Delivery::Unreliable => 1,
        }
    }

    /// Inverse of [`Delivery::as_u8`].
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Delivery::Reliable),
            1 => Some(Delivery::Unreliable),
            _ => None,
        }
    }
}

/// Something that happened on the transport since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer connected (host side) or the host accepted us (client side).
    Connected(PeerHandle),
    /// A peer went away.
    Disconnected(PeerHandle),
    /// A packet arrived.
    Packet {
        /// Sender of the packet.
        from: PeerHandle,
        /// Raw message bytes (opcode + payload).
        bytes: Vec<u8>,
    },
}

/// Errors surfaced by transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The addressed peer is not connected.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerHandle),
    /// `send_to_host` on a transport with no host connection.
    #[error("not connected to a host")]
    NoHost,
    /// The packet does not fit the delivery class budget.
    #[error("packet of {size} bytes exceeds budget {max}")]
    PacketTooLarge {
        /// Packet size.
        size: usize,
        /// Budget for the delivery class.
        max: usize,
    },
    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,
    /// The peer limit is reached.
    #[error("session full ({0} peers)")]
    Full(usize),
    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The network surface the sync core depends on.
pub trait Transport: Send {
    /// Send to one peer.
    fn send(&mut self, peer: &PeerHandle, bytes: &[u8], delivery: Delivery)
    -> Result<(), TransportError>;

    /// Send to every connected peer except `except`.
    fn broadcast(
        &mut self,
        bytes: &[u8],
        delivery: Delivery,
        except: Option<&PeerHandle>,
    ) -> Result<(), TransportError>;

    /// Client side: send to the host.
    fn send_to_host(&mut self, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError>;

    /// Drain everything that happened since the previous poll. Never blocks.
    fn poll(&mut self) -> Vec<TransportEvent>;

    /// Largest packet the backend accepts for a delivery class, if bounded.
    fn max_packet_size(&self, delivery: Delivery) -> Option<usize>;

    /// Whether the backend supports LAN discovery announcements.
    fn supports_discovery(&self) -> bool {
        false
    }

    /// Publish a discovery announcement. No-op on backends without discovery.
    fn announce(&mut self, _display_name: &str, _scene_id: &str, _players: u16) {}

    /// Currently connected peers.
    fn peers(&self) -> Vec<PeerHandle>;

    /// Drop one peer. A `Disconnected` event follows on a later poll.
    fn disconnect(&mut self, peer: &PeerHandle);

    /// Close all connections. Further sends fail with [`TransportError::Closed`].
    fn shutdown(&mut self);
}

/// Packet budget for a delivery class, falling back to [`DEFAULT_PACKET_BUDGET`].
pub fn packet_budget(transport: &dyn Transport, delivery: Delivery) -> usize {
    transport
        .max_packet_size(delivery)
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_PACKET_BUDGET)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unbounded;

    impl Transport for Unbounded {
        fn send(&mut self, _: &PeerHandle, _: &[u8], _: Delivery) -> Result<(), TransportError> {
            Ok(())
        }
        fn broadcast(
            &mut self,
            _: &[u8],
            _: Delivery,
            _: Option<&PeerHandle>,
        ) -> Result<(), TransportError> {
            Ok(())
        }
        fn send_to_host(&mut self, _: &[u8], _: Delivery) -> Result<(), TransportError> {
            Err(TransportError::NoHost)
        }
        fn poll(&mut self) -> Vec<TransportEvent> {
            Vec::new()
        }
        fn max_packet_size(&self, delivery: Delivery) -> Option<usize> {
            match delivery {
                Delivery::Reliable => Some(0),
                Delivery::Unreliable => None,
            }
        }
        fn peers(&self) -> Vec<PeerHandle> {
            Vec::new()
        }
        fn disconnect(&mut self, _: &PeerHandle) {}
        fn shutdown(&mut self) {}
    }

    #[test]
    fn test_budget_falls_back() {
        let t = Unbounded;
        assert_eq!(packet_budget(&t, Delivery::Unreliable), DEFAULT_PACKET_BUDGET);
        // A zero budget is treated as unknown.
        assert_eq!(packet_budget(&t, Delivery::Reliable), DEFAULT_PACKET_BUDGET);
        assert!(!t.supports_discovery());
    }

    #[test]
    fn test_delivery_byte() {
        for d in [Delivery::Reliable, Delivery::Unreliable] {
            assert_eq!(Delivery::from_u8(d.as_u8()), Some(d));
        }
        assert_eq!(Delivery::from_u8(7), None);
    }

    #[test]
    fn test_peer_handle_display() {
        assert_eq!(PeerHandle::Connection(ConnectionId(3)).to_string(), "conn#3");
        assert_eq!(PeerHandle::Session("abc".into()).to_string(), "session:abc");
    }
}
