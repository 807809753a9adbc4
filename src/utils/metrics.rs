//! Observability and Metrics
//!
//! Metrics collection for monitoring link health: connection attempts,
//! packet and byte counts, dropped frames and I/O failures.
//!
//! Uses atomic counters for thread-safe collection; one instance lives per
//! engine, so isolated engines (and tests) never share state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Per-engine metrics collector.
#[derive(Debug)]
pub struct LinkMetrics {
    /// Successful socket opens
    pub connections_total: AtomicU64,
    /// Failed socket opens
    pub connection_failures: AtomicU64,
    /// Packets handed to the wire
    pub packets_sent: AtomicU64,
    /// Frame bytes handed to the wire
    pub bytes_sent: AtomicU64,
    /// Packets decoded off the wire and queued
    pub packets_received: AtomicU64,
    /// Frames dropped due to decode failure
    pub frames_dropped: AtomicU64,
    /// Read/write failures, transient and fatal
    pub io_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            io_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successful socket open
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed socket open
    pub fn connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet written to the wire
    pub fn packet_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a packet decoded and queued
    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped malformed frame
    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read/write failure
    pub fn io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since this collector was created
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Consistent-enough point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connection_failures: self.connection_failures.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }

    /// Log a one-line summary at INFO
    pub fn log_summary(&self) {
        let snap = self.snapshot();
        info!(
            sent = snap.packets_sent,
            received = snap.packets_received,
            dropped = snap.frames_dropped,
            io_errors = snap.io_errors,
            uptime_secs = snap.uptime.as_secs(),
            "link metrics"
        );
    }
}

/// Plain-value copy of [`LinkMetrics`] counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connection_failures: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_received: u64,
    pub frames_dropped: u64,
    pub io_errors: u64,
    pub uptime: Duration,
}
