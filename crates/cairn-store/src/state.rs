//! The store lifecycle state and its readers-writer cell.

use std::sync::RwLock;

use tracing::debug;

/// Lifecycle phase of one node's store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreState {
    /// Fresh node; no sync round has completed yet.
    Inactive,
    /// A reconciliation round is in flight.
    Syncing,
    /// The journal view is current; upstream may route reads here.
    Active,
}

/// Readers-writer cell guarding the state enum. Readiness checks never
/// block behind a round in progress.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: RwLock<StoreState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::Inactive),
        }
    }

    pub(crate) fn get(&self) -> StoreState {
        *self.state.read().unwrap()
    }

    pub(crate) fn set(&self, next: StoreState) {
        let mut state = self.state.write().unwrap();
        if *state != next {
            debug!(from = ?*state, to = ?next, "store state changed");
            *state = next;
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.get() == StoreState::Active
    }
}
