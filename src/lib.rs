//! # BridgeLink
//!
//! Persistent-connection client that links an embedded application to an
//! external orchestration process (the *bridge*) over a private loopback TCP
//! channel, exchanging small typed, length-framed packets.
//!
//! The crate is built around two pieces of machinery:
//! - [`queue`]: a lock-free multi-producer single-consumer queue, used once
//!   per direction to hand packets between application threads and the socket
//!   I/O threads without locks on the hot path.
//! - [`service::engine::LinkEngine`]: the connection engine that owns the
//!   socket, runs the reader/writer loops and drives the
//!   connect/accept/reject handshake.
//!
//! ## Wire Format
//! ```text
//! [Discriminant(1)] [Payload(N)]
//! ```
//! String payloads are framed as a 4-byte big-endian byte count followed by
//! raw UTF-8 bytes (see [`crate::core::wire`]).
//!
//! ## Example
//! ```no_run
//! use bridgelink::{LinkConfig, LinkEngine};
//!
//! let config = LinkConfig::default();
//! let engine = LinkEngine::new(config).unwrap();
//! engine.connect();
//! if let Some(packet) = engine.read_packet() {
//!     println!("bridge sent {packet:?}");
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod service;
pub mod utils;

pub use crate::config::LinkConfig;
pub use crate::core::packet::Packet;
pub use crate::error::{LinkError, Result};
pub use crate::protocol::handshake::LinkState;
pub use crate::protocol::registry::PacketRegistry;
pub use crate::service::engine::LinkEngine;
