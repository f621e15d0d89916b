//! Observability and Metrics
//!
//! Atomic counters describing connection, handshake and tick activity.
//! One [`Metrics`] instance lives on the server context and is shared by the connection
//! supervisor, the session handlers and the tick scheduler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// File requests answered from the asset store
    pub js5_requests: AtomicU64,
    /// World list fetches answered
    pub worldlist_fetches: AtomicU64,
    /// Logins that reached the game phase
    pub logins_success: AtomicU64,
    /// Logins rejected or failed
    pub logins_failed: AtomicU64,
    /// Game packets copied into an inbound slot
    pub packets_queued: AtomicU64,
    /// Game packets dropped by the per-tick caps
    pub packets_dropped: AtomicU64,
    /// Completed ticks
    pub ticks: AtomicU64,
    /// Ticks that took at least the full interval
    pub slow_ticks: AtomicU64,
    /// Hook calls that returned an error or panicked
    pub hook_faults: AtomicU64,
    /// Bytes written to sockets
    pub bytes_sent: AtomicU64,
    /// Bytes read from sockets
    pub bytes_received: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            js5_requests: AtomicU64::new(0),
            worldlist_fetches: AtomicU64::new(0),
            logins_success: AtomicU64::new(0),
            logins_failed: AtomicU64::new(0),
            packets_queued: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            slow_ticks: AtomicU64::new(0),
            hook_faults: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn js5_request(&self) {
        self.js5_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worldlist_fetch(&self) {
        self.worldlist_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_success(&self) {
        self.logins_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn login_failed(&self) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one read's worth of framed game packets.
    pub fn packets_framed(&self, queued: u64, dropped: u64) {
        self.packets_queued.fetch_add(queued, Ordering::Relaxed);
        self.packets_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Record a finished tick and whether it overran its interval.
    pub fn tick_completed(&self, overran: bool) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if overran {
            self.slow_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn hook_fault(&self) {
        self.hook_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_out(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_in(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            js5_requests: self.js5_requests.load(Ordering::Relaxed),
            worldlist_fetches: self.worldlist_fetches.load(Ordering::Relaxed),
            logins_success: self.logins_success.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            packets_queued: self.packets_queued.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            slow_ticks: self.slow_ticks.load(Ordering::Relaxed),
            hook_faults: self.hook_faults.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            js5_requests = snapshot.js5_requests,
            worldlist_fetches = snapshot.worldlist_fetches,
            logins_success = snapshot.logins_success,
            logins_failed = snapshot.logins_failed,
            packets_queued = snapshot.packets_queued,
            packets_dropped = snapshot.packets_dropped,
            ticks = snapshot.ticks,
            slow_ticks = snapshot.slow_ticks,
            hook_faults = snapshot.hook_faults,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub js5_requests: u64,
    pub worldlist_fetches: u64,
    pub logins_success: u64,
    pub logins_failed: u64,
    pub packets_queued: u64,
    pub packets_dropped: u64,
    pub ticks: u64,
    pub slow_ticks: u64,
    pub hook_faults: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub uptime_seconds: u64,
}
