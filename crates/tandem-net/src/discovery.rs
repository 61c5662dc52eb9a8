//! LAN discovery beacons for the TCP backend.
//!
//! A hosting [`TcpTransport`](crate::tcp::TcpTransport) periodically sends a
//! small UDP datagram describing the session; clients listen on the discovery
//! port and collect the beacons they hear.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Magic prefix that distinguishes our beacons from other traffic.
pub const BEACON_MAGIC: [u8; 6] = *b"TANDEM";

/// Session advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    /// Host display name.
    pub host_name: String,
    /// Host scene.
    pub scene_id: String,
    /// TCP port to connect to.
    pub port: u16,
    /// Connected players, host included.
    pub players: u16,
    /// Protocol version of the host.
    pub protocol_version: u16,
}

impl Beacon {
    /// Beacon for the current protocol version.
    pub fn new(host_name: &str, scene_id: &str, port: u16, players: u16) -> Self {
        Self {
            host_name: host_name.to_string(),
            scene_id: scene_id.to_string(),
            port,
            players,
            protocol_version: crate::messages::PROTOCOL_VERSION,
        }
    }

    /// Encode with the magic prefix.
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        let mut out = BEACON_MAGIC.to_vec();
        out.extend_from_slice(&postcard::to_allocvec(self)?);
        Ok(out)
    }

    /// Decode a datagram; `None` for foreign or corrupt packets.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let body = data.strip_prefix(&BEACON_MAGIC[..])?;
        postcard::from_bytes(body).ok()
    }
}

/// Sends beacons to a fixed destination.
#[derive(Debug)]
pub struct DiscoveryAnnouncer {
    socket: UdpSocket,
    target: SocketAddr,
}

impl DiscoveryAnnouncer {
    /// Announce to the IPv4 broadcast address on `port`.
    pub fn broadcast(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            target: SocketAddr::from((Ipv4Addr::BROADCAST, port)),
        })
    }

    /// Announce to one address (useful on loopback).
    pub fn unicast(target: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        Ok(Self { socket, target })
    }

    /// Send one beacon.
    pub fn announce(&self, beacon: &Beacon) -> std::io::Result<()> {
        let bytes = beacon
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.socket.send_to(&bytes, self.target)?;
        Ok(())
    }
}

/// Non-blocking receiver for beacons.
#[derive(Debug)]
pub struct DiscoveryListener {
    socket: UdpSocket,
}

impl DiscoveryListener {
    /// Bind the listening socket.
    pub fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    /// Local address of the listening socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Drain every beacon received so far. The returned address carries the
    /// announced TCP port, not the datagram's source port.
    pub fn poll(&self) -> Vec<(SocketAddr, Beacon)> {
        let mut found = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => match Beacon::decode(&buf[..n]) {
                    Some(beacon) => {
                        found.push((SocketAddr::new(from.ip(), beacon.port), beacon));
                    }
                    None => tracing::trace!("Ignoring {n} byte datagram from {from}"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!("Discovery receive failed: {e}");
                    break;
                }
            }
        }
        found
    }
}

/// Listen on `port` for `window` and return one beacon per host address.
pub fn scan_for_hosts(port: u16, window: Duration) -> std::io::Result<Vec<(SocketAddr, Beacon)>> {
    let listener = DiscoveryListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    let deadline = Instant::now() + window;
    let mut hosts: HashMap<SocketAddr, Beacon> = HashMap::new();
    while Instant::now() < deadline {
        hosts.extend(listener.poll());
        std::thread::sleep(Duration::from_millis(20));
    }
    let mut hosts: Vec<_> = hosts.into_iter().collect();
    hosts.sort_by_key(|(addr, _)| *addr);
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beacon_rejects_foreign_datagrams() {
        let beacon = Beacon::new("duck", "level_1", 9050, 2);
        let bytes = beacon.encode().unwrap();
        assert_eq!(Beacon::decode(&bytes), Some(beacon));
        assert_eq!(Beacon::decode(b"HELLO world"), None);
        assert_eq!(Beacon::decode(&bytes[..BEACON_MAGIC.len() + 1]), None);
    }

    #[test]
    fn test_loopback_announce_is_heard() {
        let listener = DiscoveryListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let announcer = DiscoveryAnnouncer::unicast(listener.local_addr().unwrap()).unwrap();
        announcer
            .announce(&Beacon::new("duck", "base", 9050, 1))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut heard = Vec::new();
        while heard.is_empty() && Instant::now() < deadline {
            heard = listener.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(heard.len(), 1);
        assert_eq!(heard[0].0.port(), 9050);
        assert_eq!(heard[0].1.host_name, "duck");
    }
}
