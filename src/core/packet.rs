//! The packet catalog.
//!
//! A closed tagged union of the packet variants this protocol revision
//! defines, each with a fixed one-byte discriminant. Encoding is exhaustive
//! matching over the enum; decoding for receivable variants lives in the
//! [`registry`](crate::protocol::registry) so hosts can extend the catalog
//! with new discriminants at startup without touching this enum.

use crate::core::wire;
use bytes::BufMut;

/// A discrete typed message exchanged with the bridge.
///
/// | ID | Variant      | Payload            | Direction      |
/// |----|--------------|--------------------|----------------|
/// | 0  | `Connect`    | client identity    | client→bridge  |
/// | 1  | `Disconnect` | reason             | either         |
/// | 2  | `Advance`    | bridge-info string | bridge→client  |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Opens the handshake; carries the client identity string.
    /// Encode-only: the bridge never sends it back.
    Connect { identity: String },
    /// Terminates or rejects a session; carries the reason.
    Disconnect { reason: String },
    /// Accepts the handshake; carries the bridge's own info string.
    Advance { bridge_info: String },
}

impl Packet {
    /// Discriminant of [`Packet::Connect`].
    pub const CONNECT: u8 = 0;
    /// Discriminant of [`Packet::Disconnect`].
    pub const DISCONNECT: u8 = 1;
    /// Discriminant of [`Packet::Advance`].
    pub const ADVANCE: u8 = 2;

    /// The one-byte wire discriminant of this variant.
    pub fn discriminant(&self) -> u8 {
        match self {
            Packet::Connect { .. } => Self::CONNECT,
            Packet::Disconnect { .. } => Self::DISCONNECT,
            Packet::Advance { .. } => Self::ADVANCE,
        }
    }

    /// Encode the full frame: discriminant byte followed by the payload.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.discriminant());
        match self {
            Packet::Connect { identity } => wire::write_str(buf, identity),
            Packet::Disconnect { reason } => wire::write_str(buf, reason),
            Packet::Advance { bridge_info } => wire::write_str(buf, bridge_info),
        }
    }
}
