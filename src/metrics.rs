// Sync metrics module
//
// Lightweight counters for the connection, decode and persistence paths

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine-wide sync counters
///
/// Uses atomic operations so the network task and the main thread can record
/// without locks. Logged on shutdown and available to health checks.
#[derive(Debug)]
pub struct SyncMetrics {
    /// Connect attempts started by the remote client
    pub connect_attempts: AtomicU64,

    /// Attempts that reached the connected state
    pub connections_established: AtomicU64,

    /// `init`/`update` messages applied to the store
    pub messages_accepted: AtomicU64,

    /// Payloads dropped because they could not be decoded
    pub decode_failures: AtomicU64,

    /// Notifications handed to the notification collaborator
    pub popups_forwarded: AtomicU64,

    /// Successful writes of the backing file
    pub flushes_written: AtomicU64,

    /// Pending writes postponed by the throttle
    pub flushes_throttled: AtomicU64,

    /// Failed writes of the backing file
    pub flushes_failed: AtomicU64,

    /// Deferred effects dropped because the queue was full
    pub effects_dropped: AtomicU64,

    start_time: Instant,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            messages_accepted: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            popups_forwarded: AtomicU64::new(0),
            flushes_written: AtomicU64::new(0),
            flushes_throttled: AtomicU64::new(0),
            flushes_failed: AtomicU64::new(0),
            effects_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connected(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_accepted(&self) {
        self.messages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_popups(&self, count: usize) {
        self.popups_forwarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_flush_written(&self) {
        self.flushes_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush_throttled(&self) {
        self.flushes_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush_failed(&self) {
        self.flushes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_effect_dropped(&self) {
        self.effects_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Convenience read of a counter
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Sync Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Connections: {} attempts, {} established",
            Self::get(&self.connect_attempts),
            Self::get(&self.connections_established)
        );
        tracing::info!(
            "Messages: {} accepted, {} decode failures, {} popups forwarded",
            Self::get(&self.messages_accepted),
            Self::get(&self.decode_failures),
            Self::get(&self.popups_forwarded)
        );
        tracing::info!(
            "Flushes: {} written, {} throttled, {} failed",
            Self::get(&self.flushes_written),
            Self::get(&self.flushes_throttled),
            Self::get(&self.flushes_failed)
        );
        tracing::info!("Deferred effects dropped: {}", Self::get(&self.effects_dropped));
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
