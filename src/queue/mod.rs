//! # Lock-Free Packet Queues
//!
//! One unbounded multi-producer single-consumer queue is used per transfer
//! direction (outbound, inbound), paired with a counting [`Signal`] that
//! wakes the consumer on empty→non-empty transitions.
//!
//! ## Components
//! - **Mpsc**: the Michael–Scott style tail-swap linked queue
//! - **Signal**: the consumer-side wakeup counter with close support
//!
//! The queue itself never blocks; only the signal-gated consumer path does.

pub mod mpsc;
pub mod signal;

pub use mpsc::{channel, QueueReceiver, QueueSender};
pub use signal::Signal;
