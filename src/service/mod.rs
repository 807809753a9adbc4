//! # Engine Services
//!
//! The connection engine that ties the queues, the wire format and the
//! handshake together over one TCP socket.

pub mod engine;
