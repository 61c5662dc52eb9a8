//! Connection-oriented backend over TCP.
//!
//! [`TcpTransport`] owns a small tokio runtime. Each connection gets a reader
//! task that frames inbound packets into a shared event channel and a writer
//! task fed by a per-connection channel. The tick thread never awaits: sends
//! push into the writer channel and [`Transport::poll`] drains the event
//! channel with `try_recv`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};

use crate::discovery::{Beacon, DiscoveryAnnouncer};
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::transport::{
    ConnectionId, Delivery, PeerHandle, Transport, TransportError, TransportEvent,
};

/// Configuration for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Maximum concurrent peers on the host. Default: 8.
    pub max_peers: usize,
    /// Budget reported for unreliable packets. Default: 1200 bytes.
    pub unreliable_budget: usize,
    /// Budget reported for reliable packets. Default: 64 KiB.
    pub reliable_budget: usize,
    /// UDP port for LAN discovery beacons; `None` disables announcing.
    pub discovery_port: Option<u16>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_peers: 8,
            unreliable_budget: 1200,
            reliable_budget: 65_536,
            discovery_port: None,
        }
    }
}

impl TcpConfig {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.reliable_budget.max(self.unreliable_budget) as u32,
        }
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
#[derive(Debug)]
struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

type Outbox = mpsc::UnboundedSender<(Delivery, Vec<u8>)>;

/// Writer channels keyed by connection, shared with the accept loop.
#[derive(Clone)]
struct Writers {
    inner: Arc<Mutex<HashMap<ConnectionId, Outbox>>>,
    max: usize,
}

impl Writers {
    fn new(max: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Outbox>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Clone)]
struct Shared {
    writers: Writers,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: watch::Receiver<bool>,
    frame: FrameConfig,
}

/// TCP implementation of [`Transport`].
pub struct TcpTransport {
    runtime: Option<Runtime>,
    config: TcpConfig,
    writers: Writers,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: SocketAddr,
    /// Client side: the connection to the host.
    host: Option<ConnectionId>,
    announcer: Option<DiscoveryAnnouncer>,
}

impl TcpTransport {
    fn runtime() -> Result<Runtime, TransportError> {
        Ok(tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tandem-net")
            .enable_all()
            .build()?)
    }

    /// Host side: bind and start accepting peers.
    pub fn listen(bind_addr: SocketAddr, config: TcpConfig) -> Result<Self, TransportError> {
        let runtime = Self::runtime()?;
        let listener = runtime.block_on(TcpListener::bind(bind_addr))?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Listening on {local_addr}");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let writers = Writers::new(config.max_peers);
        let shared = Shared {
            writers: writers.clone(),
            events: events_tx,
            shutdown: shutdown_rx,
            frame: config.frame_config(),
        };
        runtime.spawn(accept_loop(listener, shared));

        let announcer = match config.discovery_port {
            Some(port) => match DiscoveryAnnouncer::broadcast(port) {
                Ok(a) => Some(a),
                Err(e) => {
                    tracing::warn!("LAN discovery disabled: {e}");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            runtime: Some(runtime),
            config,
            writers,
            events_rx,
            shutdown_tx,
            local_addr,
            host: None,
            announcer,
        })
    }

    /// Client side: connect to a host.
    pub fn connect(host_addr: SocketAddr, config: TcpConfig) -> Result<Self, TransportError> {
        let runtime = Self::runtime()?;
        let stream = runtime.block_on(TcpStream::connect(host_addr))?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let writers = Writers::new(1);
        let shared = Shared {
            writers: writers.clone(),
            events: events_tx,
            shutdown: shutdown_rx,
            frame: config.frame_config(),
        };

        let id = IdGenerator::new().next_id();
        let (reader, writer) = stream.into_split();
        {
            let _guard = runtime.enter();
            register(id, reader, writer, &shared);
        }
        tracing::info!("Connected to host {host_addr} as {id}");

        Ok(Self {
            runtime: Some(runtime),
            config,
            writers,
            events_rx,
            shutdown_tx,
            local_addr,
            host: Some(id),
            announcer: None,
        })
    }

    /// Address the transport is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn queue(&self, id: ConnectionId, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        if self.runtime.is_none() {
            return Err(TransportError::Closed);
        }
        self.check_size(bytes, delivery)?;
        let writers = self.writers.lock();
        let outbox = writers
            .get(&id)
            .ok_or(TransportError::UnknownPeer(PeerHandle::Connection(id)))?;
        outbox
            .send((delivery, bytes.to_vec()))
            .map_err(|_| TransportError::UnknownPeer(PeerHandle::Connection(id)))
    }

    fn check_size(&self, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
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
            Delivery::Reliable => self.config.reliable_budget,
            Delivery::Unreliable => self.config.unreliable_budget,
        }
    }
}

async fn accept_loop(listener: TcpListener, shared: Shared) {
    let ids = IdGenerator::new();
    let mut shutdown_rx = shared.shutdown.clone();
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("Accept failed: {e}");
                        continue;
                    }
                };
                if stream.set_nodelay(true).is_err() {
                    continue;
                }
                if shared.writers.lock().len() >= shared.writers.max {
                    tracing::warn!("Peer limit reached, rejecting {peer_addr}");
                    continue;
                }
                let id = ids.next_id();
                let (reader, writer) = stream.into_split();
                register(id, reader, writer, &shared);
                tracing::info!("Accepted {id} from {peer_addr}");
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Install the writer channel and spawn the reader/writer tasks of one
/// connection. Must run inside the transport's runtime.
fn register(id: ConnectionId, reader: OwnedReadHalf, writer: OwnedWriteHalf, shared: &Shared) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    shared.writers.lock().insert(id, out_tx);
    let _ = shared
        .events
        .send(TransportEvent::Connected(PeerHandle::Connection(id)));

    tokio::spawn(writer_task(id, writer, out_rx, shared.frame.clone()));

    let shared = shared.clone();
    tokio::spawn(async move {
        let mut shutdown_rx = shared.shutdown.clone();
        reader_task(id, reader, &shared, &mut shutdown_rx).await;
        shared.writers.lock().remove(&id);
        let _ = shared
            .events
            .send(TransportEvent::Disconnected(PeerHandle::Connection(id)));
        tracing::info!("Connection {id} closed");
    });
}

async fn reader_task(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    shared: &Shared,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = read_frame(&mut reader, &shared.frame) => {
                match result {
                    Ok((_delivery, bytes)) => {
                        tracing::trace!("{id} received {} bytes", bytes.len());
                        let event = TransportEvent::Packet {
                            from: PeerHandle::Connection(id),
                            bytes,
                        };
                        if shared.events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(FrameError::ConnectionClosed) => break,
                    Err(e) => {
                        tracing::warn!("Dropping {id}: {e}");
                        break;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn writer_task(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut out_rx: mpsc::UnboundedReceiver<(Delivery, Vec<u8>)>,
    frame: FrameConfig,
) {
    while let Some((delivery, bytes)) = out_rx.recv().await {
        if let Err(e) = write_frame(&mut writer, delivery, &bytes, &frame).await {
            tracing::debug!("Write to {id} failed: {e}");
            break;
        }
    }
}

impl Transport for TcpTransport {
    fn send(
        &mut self,
        peer: &PeerHandle,
        bytes: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        match peer {
            PeerHandle::Connection(id) => self.queue(*id, bytes, delivery),
            PeerHandle::Session(_) => Err(TransportError::UnknownPeer(peer.clone())),
        }
    }

    fn broadcast(
        &mut self,
        bytes: &[u8],
        delivery: Delivery,
        except: Option<&PeerHandle>,
    ) -> Result<(), TransportError> {
        if self.runtime.is_none() {
            return Err(TransportError::Closed);
        }
        self.check_size(bytes, delivery)?;
        let writers = self.writers.lock();
        for (id, outbox) in writers.iter() {
            if except == Some(&PeerHandle::Connection(*id)) {
                continue;
            }
            // A closed outbox means the reader task is about to report the disconnect.
            let _ = outbox.send((delivery, bytes.to_vec()));
        }
        Ok(())
    }

    fn send_to_host(&mut self, bytes: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        let id = self.host.ok_or(TransportError::NoHost)?;
        self.queue(id, bytes, delivery)
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn max_packet_size(&self, delivery: Delivery) -> Option<usize> {
        Some(self.budget(delivery))
    }

    fn supports_discovery(&self) -> bool {
        self.announcer.is_some()
    }

    fn announce(&mut self, display_name: &str, scene_id: &str, players: u16) {
        let port = self.local_addr.port();
        if let Some(announcer) = &self.announcer {
            let beacon = Beacon::new(display_name, scene_id, port, players);
            if let Err(e) = announcer.announce(&beacon) {
                tracing::debug!("Discovery beacon failed: {e}");
            }
        }
    }

    fn peers(&self) -> Vec<PeerHandle> {
        let mut ids: Vec<ConnectionId> = self.writers.lock().keys().copied().collect();
        ids.sort();
        ids.into_iter().map(PeerHandle::Connection).collect()
    }

    fn disconnect(&mut self, peer: &PeerHandle) {
        if let PeerHandle::Connection(id) = peer
            && self.writers.lock().remove(id).is_some()
        {
            // Dropping the outbox ends the writer task, which closes our half.
            tracing::info!("Disconnecting {id}");
        }
    }

    fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(true);
        self.writers.lock().clear();
        runtime.shutdown_background();
        tracing::info!("Transport on {} shut down", self.local_addr);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}
