//! # Core Wire Format
//!
//! Low-level framing primitives and the packet catalog.
//!
//! ## Components
//! - **Wire**: length-prefixed UTF-8 string framing, the only variable-length
//!   primitive on the wire
//! - **Packet**: the closed tagged union of packet variants with their fixed
//!   discriminants
//!
//! ## Wire Format
//! ```text
//! [Discriminant(1)] [Payload(N)]
//! ```
//!
//! There is no resynchronization beyond the byte-aligned framing itself: a
//! corrupted length field desynchronizes every following frame boundary.

pub mod packet;
pub mod wire;
