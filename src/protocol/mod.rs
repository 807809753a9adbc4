//! # Protocol Layer
//!
//! Discriminant-driven packet dispatch and the connect/accept/reject
//! handshake.
//!
//! ## Components
//! - **Registry**: maps a discriminant byte to a decode function; extensible
//!   at process start, so new packet variants need no protocol-version
//!   negotiation
//! - **Handshake**: the initial `Connect` → `Advance`-or-`Disconnect`
//!   exchange and the connection state machine

pub mod handshake;
pub mod registry;
