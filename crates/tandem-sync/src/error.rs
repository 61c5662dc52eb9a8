use tandem_net::item::ItemTreeError;
use tandem_net::messages::{MessageError, Opcode};
use tandem_net::transport::TransportError;

/// Errors surfaced by the sync core.
///
/// None of these are fatal: handler errors are logged by the router and the
/// message is dropped, API errors are returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A transport operation failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A message could not be encoded or decoded.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// An item tree failed validation.
    #[error("invalid item: {0}")]
    InvalidItem(#[from] ItemTreeError),

    /// A handler was invoked with a message of another kind.
    #[error("unexpected message {0:?}")]
    UnexpectedMessage(Opcode),

    /// A packet came from a peer that never introduced itself.
    #[error("message from unregistered peer {0}")]
    UnknownSender(String),

    /// The operation needs a host connection.
    #[error("not connected to a host")]
    NotConnected,

    /// The local player has no inventory.
    #[error("no local inventory")]
    NoLocalInventory,

    /// The referenced local inventory slot is empty.
    #[error("inventory slot {0} is empty")]
    EmptySlot(u16),

    /// The container id is not bound on this side.
    #[error("unknown container {0}")]
    UnknownContainer(u32),
}
