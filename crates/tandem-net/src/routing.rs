//! Message routing: decode raw packets and dispatch them to role-gated
//! handlers.
//!
//! The [`Router`] maps each [`Opcode`] to one handler plus a [`RoleGate`].
//! [`Router::dispatch`] is fail-open: unknown opcodes, malformed payloads,
//! handler errors and handler panics are logged and counted, and the packet
//! is dropped without affecting the connection or later packets.

use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::messages::{Message, MessageError, Opcode, decode_message, peek_opcode};
use crate::transport::PeerHandle;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Which side of the session this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Authoritative owner of shared state.
    Host,
    /// Mirrors host state and sends requests.
    Client,
}

/// Which roles accept a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGate {
    /// Handled only on the host.
    HostOnly,
    /// Handled only on clients.
    ClientOnly,
    /// Handled everywhere.
    Both,
}

impl RoleGate {
    /// Whether `role` passes the gate.
    pub fn admits(self, role: Role) -> bool {
        match self {
            RoleGate::HostOnly => role == Role::Host,
            RoleGate::ClientOnly => role == Role::Client,
            RoleGate::Both => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// A decoded message together with its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Sending peer, `None` for locally injected messages.
    pub sender: Option<PeerHandle>,
    /// The decoded message.
    pub message: Message,
}

/// Handler for one opcode. `C` is the state the handler mutates.
pub trait MessageHandler<C, E> {
    /// Process a single message.
    fn handle(&self, ctx: &mut C, inbound: Inbound) -> Result<(), E>;
}

impl<C, E, F> MessageHandler<C, E> for F
where
    F: Fn(&mut C, Inbound) -> Result<(), E>,
{
    fn handle(&self, ctx: &mut C, inbound: Inbound) -> Result<(), E> {
        self(ctx, inbound)
    }
}

struct Route<C, E> {
    gate: RoleGate,
    handler: Box<dyn MessageHandler<C, E> + Send>,
}

// ---------------------------------------------------------------------------
// Outcome and stats
// ---------------------------------------------------------------------------

/// What happened to a dispatched packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// The handler ran and succeeded.
    Handled,
    /// The opcode byte is not in the protocol (or the packet was empty).
    UnknownOpcode,
    /// The payload failed to decode.
    Malformed,
    /// The handler is gated to the other role.
    WrongRole,
    /// The opcode is known but nothing is registered for it.
    Unhandled,
    /// The handler returned an error.
    Failed,
    /// The handler panicked.
    Panicked,
}

/// Per-outcome dispatch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Successfully handled packets.
    pub handled: u64,
    /// Unknown opcodes.
    pub unknown_opcode: u64,
    /// Malformed payloads.
    pub malformed: u64,
    /// Packets gated to the other role.
    pub wrong_role: u64,
    /// Packets with no registered handler.
    pub unhandled: u64,
    /// Handler errors.
    pub failed: u64,
    /// Handler panics.
    pub panicked: u64,
}

impl RouterStats {
    fn record(&mut self, outcome: DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Handled => &mut self.handled,
            DispatchOutcome::UnknownOpcode => &mut self.unknown_opcode,
            DispatchOutcome::Malformed => &mut self.malformed,
            DispatchOutcome::WrongRole => &mut self.wrong_role,
            DispatchOutcome::Unhandled => &mut self.unhandled,
            DispatchOutcome::Failed => &mut self.failed,
            DispatchOutcome::Panicked => &mut self.panicked,
        };
        *counter += 1;
    }

    /// Every packet that was dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.unknown_opcode
            + self.malformed
            + self.wrong_role
            + self.unhandled
            + self.failed
            + self.panicked
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes raw packets to handlers registered per [`Opcode`].
pub struct Router<C, E> {
    role: Role,
    routes: HashMap<Opcode, Route<C, E>>,
    stats: RouterStats,
}

impl<C, E: Display> Router<C, E> {
    /// Create an empty router for `role`.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            routes: HashMap::new(),
            stats: RouterStats::default(),
        }
    }

    /// Role the router was built for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Register (or replace) the handler for `opcode`.
    pub fn register<H>(&mut self, opcode: Opcode, gate: RoleGate, handler: H)
    where
        H: MessageHandler<C, E> + Send + 'static,
    {
        self.routes.insert(
            opcode,
            Route {
                gate,
                handler: Box::new(handler),
            },
        );
    }

    /// Whether a handler exists for `opcode`.
    pub fn is_registered(&self, opcode: Opcode) -> bool {
        self.routes.contains_key(&opcode)
    }

    /// Dispatch counters so far.
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Decode `bytes` and run the matching handler against `ctx`.
    ///
    /// The buffer is consumed and released on every path.
    pub fn dispatch(
        &mut self,
        ctx: &mut C,
        sender: Option<PeerHandle>,
        bytes: Vec<u8>,
    ) -> DispatchOutcome {
        let outcome = self.dispatch_inner(ctx, sender, &bytes);
        self.stats.record(outcome);
        outcome
    }

    fn dispatch_inner(
        &self,
        ctx: &mut C,
        sender: Option<PeerHandle>,
        bytes: &[u8],
    ) -> DispatchOutcome {
        let opcode = match peek_opcode(bytes) {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!("Dropping packet from {}: {e}", describe(&sender));
                return DispatchOutcome::UnknownOpcode;
            }
        };

        let Some(route) = self.routes.get(&opcode) else {
            tracing::debug!("No handler for {opcode:?}, dropping");
            return DispatchOutcome::Unhandled;
        };

        if !route.gate.admits(self.role) {
            tracing::warn!(
                "{opcode:?} from {} is not accepted by a {:?}",
                describe(&sender),
                self.role
            );
            return DispatchOutcome::WrongRole;
        }

        let message = match decode_message(bytes) {
            Ok(m) => m,
            Err(MessageError::Malformed { source, .. }) => {
                tracing::warn!("Malformed {opcode:?} from {}: {source}", describe(&sender));
                return DispatchOutcome::Malformed;
            }
            Err(e) => {
                tracing::warn!("Undecodable {opcode:?} from {}: {e}", describe(&sender));
                return DispatchOutcome::Malformed;
            }
        };

        tracing::trace!("{opcode:?} from {} ({} bytes)", describe(&sender), bytes.len());
        let inbound = Inbound { sender, message };
        match catch_unwind(AssertUnwindSafe(|| route.handler.handle(ctx, inbound))) {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                tracing::warn!("{opcode:?} handler failed: {e}");
                DispatchOutcome::Failed
            }
            Err(_) => {
                tracing::error!("{opcode:?} handler panicked; message discarded");
                DispatchOutcome::Panicked
            }
        }
    }
}

fn describe(sender: &Option<PeerHandle>) -> String {
    match sender {
        Some(peer) => peer.to_string(),
        None => "local".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::*;
    use crate::transport::ConnectionId;

    #[derive(Default)]
    struct Counter {
        pings: Vec<u32>,
    }

    fn ping_router(role: Role, gate: RoleGate) -> Router<Counter, String> {
        let mut router = Router::new(role);
        router.register(Opcode::Ping, gate, |ctx: &mut Counter, inbound: Inbound| {
            match inbound.message {
                Message::Ping(p) => {
                    ctx.pings.push(p.seq);
                    Ok(())
                }
                other => Err(format!("unexpected {:?}", other.opcode())),
            }
        });
        router
    }

    fn ping(seq: u32) -> Vec<u8> {
        encode_message(&Ping { seq }.into()).unwrap()
    }

    fn peer() -> Option<PeerHandle> {
        Some(PeerHandle::Connection(ConnectionId(1)))
    }

    #[test]
    fn test_message_routed_to_handler() {
        let mut router = ping_router(Role::Host, RoleGate::Both);
        let mut ctx = Counter::default();
        assert_eq!(router.dispatch(&mut ctx, peer(), ping(4)), DispatchOutcome::Handled);
        assert_eq!(ctx.pings, vec![4]);
        assert_eq!(router.stats().handled, 1);
    }

    #[test]
    fn test_role_gate() {
        let mut ctx = Counter::default();
        let mut host = ping_router(Role::Host, RoleGate::ClientOnly);
        assert_eq!(host.dispatch(&mut ctx, peer(), ping(1)), DispatchOutcome::WrongRole);

        let mut client = ping_router(Role::Client, RoleGate::ClientOnly);
        assert_eq!(client.dispatch(&mut ctx, peer(), ping(2)), DispatchOutcome::Handled);
        assert_eq!(ctx.pings, vec![2]);
    }

    #[test]
    fn test_bad_packets_are_dropped_and_counted() {
        let mut router = ping_router(Role::Host, RoleGate::Both);
        let mut ctx = Counter::default();

        assert_eq!(router.dispatch(&mut ctx, peer(), vec![]), DispatchOutcome::UnknownOpcode);
        assert_eq!(
            router.dispatch(&mut ctx, peer(), vec![0xFE, 1]),
            DispatchOutcome::UnknownOpcode
        );
        assert_eq!(
            router.dispatch(&mut ctx, peer(), vec![Opcode::Ping as u8]),
            DispatchOutcome::Malformed
        );
        let pong = encode_message(&Pong { seq: 1 }.into()).unwrap();
        assert_eq!(router.dispatch(&mut ctx, peer(), pong), DispatchOutcome::Unhandled);

        // The router keeps working afterwards.
        assert_eq!(router.dispatch(&mut ctx, None, ping(9)), DispatchOutcome::Handled);
        assert_eq!(router.stats().dropped(), 4);
    }

    #[test]
    fn test_handler_error_and_panic_are_contained() {
        let mut router: Router<Counter, String> = Router::new(Role::Client);
        router.register(Opcode::Ping, RoleGate::Both, |_: &mut Counter, _: Inbound| -> Result<(), String> {
            Err("nope".to_string())
        });
        router.register(Opcode::Pong, RoleGate::Both, |_: &mut Counter, _: Inbound| -> Result<(), String> {
            panic!("handler bug")
        });
        let mut ctx = Counter::default();

        assert_eq!(router.dispatch(&mut ctx, peer(), ping(1)), DispatchOutcome::Failed);
        let pong = encode_message(&Pong { seq: 1 }.into()).unwrap();
        assert_eq!(router.dispatch(&mut ctx, peer(), pong), DispatchOutcome::Panicked);
        assert_eq!(router.stats().failed, 1);
        assert_eq!(router.stats().panicked, 1);
    }
}
