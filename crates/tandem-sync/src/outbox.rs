//! Outgoing message queue.
//!
//! Subsystems never talk to the transport directly. They push addressed
//! messages into the [`Outbox`]; once per tick the session resolves targets
//! against the player registry and hands encoded bytes to the transport with
//! the opcode's delivery class.

use tandem_net::messages::{Message, encode_message};
use tandem_net::transport::{PeerHandle, Transport};

/// Who a message is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// One transport peer.
    Peer(PeerHandle),
    /// One participant, by endpoint id.
    Endpoint(String),
    /// The host (client side).
    Host,
    /// Every connected peer, optionally skipping one endpoint.
    Broadcast {
        /// Endpoint to skip.
        except: Option<String>,
    },
    /// Every in-game peer whose scene matches `scene_id`.
    InScene {
        /// Raw scene id.
        scene_id: String,
        /// Endpoint to skip.
        except: Option<String>,
    },
}

/// An addressed message.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    /// Recipient(s).
    pub target: Target,
    /// Payload.
    pub message: Message,
}

/// Endpoint lookups needed to resolve [`Target`]s.
pub trait PeerDirectory {
    /// Transport handle of a participant.
    fn peer_for(&self, endpoint_id: &str) -> Option<PeerHandle>;
    /// `(endpoint, peer)` of every connected, in-game participant sharing `scene_id`.
    fn peers_sharing(&self, scene_id: &str) -> Vec<(String, PeerHandle)>;
}

/// Counters from one [`Outbox::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Transport calls that succeeded.
    pub sent: usize,
    /// Messages dropped (unresolvable target, encode or send failure).
    pub dropped: usize,
}

/// FIFO of addressed messages.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    /// Empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message.
    pub fn push(&mut self, target: Target, message: impl Into<Message>) {
        self.queue.push(Outgoing {
            target,
            message: message.into(),
        });
    }

    /// Queued messages.
    pub fn queued(&self) -> &[Outgoing] {
        &self.queue
    }

    /// Remove and return everything queued.
    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Encode and send everything queued, in order.
    ///
    /// Failures are logged and counted; the rest of the queue still goes out.
    pub fn flush(
        &mut self,
        transport: &mut dyn Transport,
        directory: &dyn PeerDirectory,
    ) -> FlushStats {
        let mut stats = FlushStats::default();
        for Outgoing { target, message } in self.drain() {
            let opcode = message.opcode();
            let delivery = opcode.delivery();
            let bytes = match encode_message(&message) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!("Failed to encode {opcode:?}: {e}");
                    stats.dropped += 1;
                    continue;
                }
            };

            let result = match &target {
                Target::Peer(peer) => transport.send(peer, &bytes, delivery),
                Target::Host => transport.send_to_host(&bytes, delivery),
                Target::Endpoint(endpoint) => match directory.peer_for(endpoint) {
                    Some(peer) => transport.send(&peer, &bytes, delivery),
                    None => {
                        tracing::debug!("{opcode:?} for departed endpoint {endpoint}, dropping");
                        stats.dropped += 1;
                        continue;
                    }
                },
                Target::Broadcast { except } => {
                    let skip = except.as_deref().and_then(|e| directory.peer_for(e));
                    transport.broadcast(&bytes, delivery, skip.as_ref())
                }
                Target::InScene { scene_id, except } => {
                    for (endpoint, peer) in directory.peers_sharing(scene_id) {
                        if except.as_deref() == Some(endpoint.as_str()) {
                            continue;
                        }
                        match transport.send(&peer, &bytes, delivery) {
                            Ok(()) => stats.sent += 1,
                            Err(e) => {
                                tracing::warn!("Failed to send {opcode:?} to {peer}: {e}");
                                stats.dropped += 1;
                            }
                        }
                    }
                    continue;
                }
            };

            match result {
                Ok(()) => {
                    tracing::trace!("Sent {opcode:?} ({} bytes) to {target:?}", bytes.len());
                    stats.sent += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to send {opcode:?} to {target:?}: {e}");
                    stats.dropped += 1;
                }
            }
        }
        stats
    }
}
