//! REVENANT - Engine Metrics & Observability
//! Lock-free atomic counters tracking engine activity.
//!
//! All counters use `Ordering::Relaxed` since we only need eventual
//! consistency for observability, not synchronization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for the Revenant engine.
#[derive(Debug)]
pub struct StoreMetrics {
    /// Commands executed (including those run at EXEC time).
    pub commands: AtomicU64,
    /// Records appended to the AOF (partition markers included).
    pub aof_appends: AtomicU64,
    /// Records fed back through the dispatcher during replay.
    pub replayed: AtomicU64,
    /// Completed log rewrites.
    pub rewrites: AtomicU64,
    /// Transactions aborted by a watch-version conflict.
    pub txn_aborts: AtomicU64,
    /// Timestamp when the store was opened.
    started: Instant,
}

impl StoreMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            commands: AtomicU64::new(0),
            aof_appends: AtomicU64::new(0),
            replayed: AtomicU64::new(0),
            rewrites: AtomicU64::new(0),
            txn_aborts: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// One append call may emit several records (partition marker, TTL
    /// translation), so the count is passed in.
    pub fn record_append(&self, records: u64) {
        self.aof_appends.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_replayed(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rewrite(&self) {
        self.rewrites.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_txn_abort(&self) {
        self.txn_aborts.fetch_add(1, Ordering::Relaxed);
    }

    /// Store uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "commands: {}, aof appends: {}, replayed: {}, rewrites: {}, txn aborts: {}, uptime: {:.2}s",
            self.commands.load(Ordering::Relaxed),
            self.aof_appends.load(Ordering::Relaxed),
            self.replayed.load(Ordering::Relaxed),
            self.rewrites.load(Ordering::Relaxed),
            self.txn_aborts.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}
