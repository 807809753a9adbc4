//! # Utility Modules
//!
//! Supporting utilities for logging, observability and task scheduling.
//!
//! ## Components
//! - **Logging**: structured logging configuration (tracing-subscriber)
//! - **Metrics**: thread-safe observability counters
//! - **Pool**: the fixed-size worker pool the engine runs its tasks on

pub mod logging;
pub mod metrics;
pub mod pool;

pub use metrics::{LinkMetrics, MetricsSnapshot};
pub use pool::WorkerPool;
