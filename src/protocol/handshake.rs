//! Handshake protocol and connection state machine.
//!
//! The client opens with `Connect{identity}`; the bridge answers with either
//! `Advance{bridge_info}` (session established) or `Disconnect{reason}`
//! (session rejected, socket closed). No further exchange is defined in this
//! protocol revision.
//!
//! The functions here are pure so the flow can be exercised without a
//! socket; the [`LinkEngine`](crate::service::engine::LinkEngine) wires them
//! to real I/O.

use crate::core::packet::Packet;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::debug;

/// Lifecycle of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    /// No connection attempt in flight.
    Idle = 0,
    /// Socket open submitted to the worker pool.
    Connecting = 1,
    /// Socket open, reader/writer loops running.
    Connected = 2,
    /// `Connect` sent, waiting for the bridge's verdict.
    Handshaking = 3,
    /// Bridge accepted the session.
    Established = 4,
    /// Bridge rejected the session; socket closed deliberately.
    Rejected = 5,
    /// Link torn down (peer vanished, fatal I/O, or local shutdown).
    Closed = 6,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LinkState::Connecting,
            2 => LinkState::Connected,
            3 => LinkState::Handshaking,
            4 => LinkState::Established,
            5 => LinkState::Rejected,
            6 => LinkState::Closed,
            _ => LinkState::Idle,
        }
    }
}

/// Atomic cell holding the current [`LinkState`].
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: LinkState) {
        let prev = LinkState::from_u8(self.0.swap(state as u8, Ordering::AcqRel));
        if prev != state {
            debug!(?prev, next = ?state, "link state transition");
        }
    }
}

/// What the bridge's first reply means for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeVerdict {
    /// `Advance` received: session established.
    Accepted { bridge_info: String },
    /// `Disconnect` received: the designed rejection path, not an error.
    Rejected { reason: String },
    /// Anything else, including no reply at all. Unhandled in this protocol
    /// revision; the engine logs it and stays in `Handshaking`.
    Anomaly { reply: Option<Packet> },
}

/// The opening packet of the handshake.
pub fn initiate(identity: &str) -> Packet {
    Packet::Connect {
        identity: identity.to_string(),
    }
}

/// Classify the bridge's first reply.
pub fn resolve(reply: Option<Packet>) -> HandshakeVerdict {
    match reply {
        Some(Packet::Advance { bridge_info }) => HandshakeVerdict::Accepted { bridge_info },
        Some(Packet::Disconnect { reason }) => HandshakeVerdict::Rejected { reason },
        other => HandshakeVerdict::Anomaly { reply: other },
    }
}
