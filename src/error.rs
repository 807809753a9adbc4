//! # Error Types
//!
//! Error handling for the bridge-link transport engine.
//!
//! This module defines all error variants that can occur while talking to the
//! bridge, from low-level I/O failures to malformed frames on the wire.
//!
//! ## Error Categories
//! - **I/O Errors**: socket open, read and write failures
//! - **Frame Errors**: truncated payloads, unknown discriminants, bad UTF-8
//! - **Lifecycle Errors**: operations against an engine with no live session
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common cases.
pub mod constants {
    /// Registry-related error messages
    pub const ERR_REGISTRY_WRITE_LOCK: &str = "Failed to acquire write lock on packet registry";
    pub const ERR_REGISTRY_READ_LOCK: &str = "Failed to acquire read lock on packet registry";

    /// Connection errors
    pub const ERR_NOT_CONNECTED: &str = "Engine has no active bridge session";
    pub const ERR_STREAM_CLONE: &str = "Could not obtain reader/writer streams from socket";
}

/// Primary error type for all bridge-link operations
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Could not connect to bridge: {0}")]
    ConnectFailure(String),

    #[error("Frame truncated: expected {expected} more bytes")]
    TruncatedFrame { expected: usize },

    #[error("Unknown packet discriminant: {0:#04x}")]
    UnknownPacket(u8),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Engine is not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using LinkError
pub type Result<T> = std::result::Result<T, LinkError>;
