//! REVENANT - Connection Session State
//! Per-connection state consumed by the dispatcher and the transaction
//! engine: the selected partition, the MULTI queue and the WATCH set.

use std::collections::HashMap;

use crate::types::Request;

/// State carried across the requests of one client connection.
///
/// A session may hold at most one open transaction at a time. The queue
/// and watch set are cleared unconditionally when EXEC or DISCARD runs,
/// whatever the outcome.
#[derive(Debug, Default)]
pub struct Session {
    /// Selected logical database partition.
    pub db_index: usize,
    /// True between MULTI and EXEC/DISCARD.
    pub in_transaction: bool,
    /// Commands queued verbatim while the transaction is open.
    pub queue: Vec<Request>,
    /// key -> entry version observed at WATCH time.
    pub watch: HashMap<String, u64>,
}

impl Session {
    /// Fresh session targeting partition 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Detached session for AOF replay: commands run through the normal
    /// execution path but every produced response is discarded.
    pub fn detached() -> Self {
        Self::default()
    }

    /// Drop transaction state. Runs unconditionally after EXEC/DISCARD.
    pub fn reset_transaction(&mut self) {
        self.in_transaction = false;
        self.queue.clear();
        self.watch.clear();
    }
}
