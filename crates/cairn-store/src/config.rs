//! Configuration for the coordination engine.

use std::time::Duration;

/// Tunables for one node's store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Workers draining the inbound announce feed.
    pub inbound_workers: usize,
    /// Workers draining the outbound announce feed.
    pub outbound_workers: usize,
    /// Capacity of each bounded worker feed; overflow accumulates in the
    /// pump's unbounded queue, never on callers.
    pub feed_capacity: usize,
    /// Deadline for delivering one announce to one peer.
    pub announce_timeout: Duration,
    /// Deadline for handling one inbound announce.
    pub handle_timeout: Duration,
    /// Deadline for one sync exchange with one peer.
    pub sync_timeout: Duration,
    /// Pause after construction before the first sync round.
    pub sync_grace: Duration,
    /// Pause between failed startup sync rounds.
    pub sync_retry: Duration,
    /// Pause between journal consolidation passes.
    pub consolidate_interval: Duration,
    /// Poll interval while waiting for readiness.
    pub ready_poll: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            inbound_workers: 4,
            outbound_workers: 4,
            feed_capacity: 1024,
            announce_timeout: Duration::from_secs(10 * 60),
            handle_timeout: Duration::from_secs(20),
            sync_timeout: Duration::from_secs(10 * 60),
            sync_grace: Duration::from_secs(2),
            sync_retry: Duration::from_secs(2),
            consolidate_interval: Duration::from_secs(24 * 60 * 60),
            ready_poll: Duration::from_secs(2),
        }
    }
}
