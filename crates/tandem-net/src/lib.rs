//! Tandem networking: wire codec, transport abstraction with two backends,
//! and the role-gated protocol router.

pub mod discovery;
pub mod framing;
pub mod item;
pub mod messages;
pub mod quantize;
pub mod relay;
pub mod routing;
pub mod tcp;
pub mod transport;

pub use discovery::{Beacon, DiscoveryAnnouncer, DiscoveryListener, scan_for_hosts};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use item::{ItemSlot, ItemSource, ItemTree, ItemTreeError};
pub use messages::{
    Message, MessageError, NetId, Opcode, PROTOCOL_VERSION, decode_message, encode_message,
};
pub use quantize::{PackedDir, QuantVec3};
pub use relay::{RelayConfig, RelayHub, RelayTransport};
pub use routing::{DispatchOutcome, Inbound, MessageHandler, Role, RoleGate, Router, RouterStats};
pub use tcp::{TcpConfig, TcpTransport};
pub use transport::{
    ConnectionId, DEFAULT_PACKET_BUDGET, Delivery, PeerHandle, Transport, TransportError,
    TransportEvent, packet_budget,
};
