//! Startup and on-demand journal reconciliation.
//!
//! One round pulls deltas from every peer in parallel, folds them into a
//! single last-writer-wins view, applies that view to the owning journal
//! in one mutation, and then announces what was learned so stragglers
//! catch up. Replaying a round with identical peer answers leaves the
//! journal unchanged.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, warn};

use cairn_cluster::{ClusterManager, EventAnnounce};
use cairn_journal::{ConsistencyLevel, FileMeta, FileMetaList, JournalManager};
use cairn_storage::{LocalStorage, StorageError};

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::pump::PumpHandle;
use crate::state::{StateCell, StoreState};

/// What one reconciliation round did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The cluster has no peers; there was nothing to reconcile.
    NothingToDo,
    /// The round completed against the current peer set.
    Synced {
        /// Live records learned from peers and applied.
        added: usize,
        /// Tombstones learned from peers and applied.
        deleted: usize,
    },
}

/// Drives reconciliation rounds against the rest of the cluster.
pub(crate) struct SyncEngine {
    node_id: String,
    config: StoreConfig,
    state: Arc<StateCell>,
    journals: Arc<JournalManager>,
    local: Arc<dyn LocalStorage>,
    cluster: Arc<dyn ClusterManager>,
    inbound: PumpHandle,
    outbound: PumpHandle,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        node_id: String,
        config: StoreConfig,
        state: Arc<StateCell>,
        journals: Arc<JournalManager>,
        local: Arc<dyn LocalStorage>,
        cluster: Arc<dyn ClusterManager>,
        inbound: PumpHandle,
        outbound: PumpHandle,
    ) -> Self {
        Self {
            node_id,
            config,
            state,
            journals,
            local,
            cluster,
            inbound,
            outbound,
        }
    }

    /// Run one reconciliation round.
    pub(crate) async fn run_round(&self) -> StoreResult<SyncOutcome> {
        let nodes = self.cluster.list_nodes().await?;
        if nodes.len() < 2 {
            self.state.set(StoreState::Active);
            return Ok(SyncOutcome::NothingToDo);
        }
        self.state.set(StoreState::Syncing);

        let list = self.journals.export_all().await;

        let mut exchanges = JoinSet::new();
        for node in nodes {
            if node.id == self.node_id {
                continue;
            }
            let cluster = Arc::clone(&self.cluster);
            let list = list.clone();
            let deadline = self.config.sync_timeout;
            exchanges.spawn(async move {
                let peer = node.id;
                let answer = timeout(deadline, cluster.sync(&peer, list)).await;
                (peer, answer)
            });
        }

        let mut peer_added = FileMetaList::new();
        let mut peer_deleted = FileMetaList::new();
        while let Some(joined) = exchanges.join_next().await {
            let Ok((peer, answer)) = joined else { continue };
            match answer {
                Ok(Ok((added, deleted))) => {
                    debug!(peer = %peer, added = added.len(), deleted = deleted.len(), "sync exchange done");
                    peer_added.extend(added);
                    peer_deleted.extend(deleted);
                }
                Ok(Err(err)) => warn!(peer = %peer, error = %err, "sync exchange failed"),
                Err(_) => warn!(peer = %peer, "sync exchange timed out"),
            }
        }

        let (adds, deletes) = reconcile(peer_added, peer_deleted);

        // Tombstoned objects lose their local bytes before the record
        // lands; a missing file is the common case, not a fault.
        for meta in deletes.values() {
            match self.local.remove(&meta.id).await {
                Ok(()) | Err(StorageError::NotFound { .. }) => {}
                Err(err) => warn!(id = %meta.id, error = %err, "removing tombstoned object"),
            }
        }

        let mut replicate = Vec::new();
        for meta in adds.values() {
            if meta.consistency == ConsistencyLevel::Full {
                replicate.push(meta.clone());
            }
        }

        let records: Vec<FileMeta> = adds
            .values()
            .map(|meta| {
                let mut record = meta.clone();
                // Bytes live elsewhere until replication pulls them in.
                record.is_symlink = true;
                record
            })
            .chain(deletes.values().cloned())
            .collect();
        self.journals
            .update(&self.node_id, move |journal| {
                for record in records {
                    journal.upsert(record);
                }
                Ok(())
            })
            .await?;

        // Full-consistency objects must end up with local bytes; replay
        // them through the inbound pipeline for the replication handler.
        for meta in replicate {
            self.inbound.submit(EventAnnounce::FileAdded(meta));
        }

        self.state.set(StoreState::Active);

        // Catch-up: spread what this round learned.
        let (added, deleted) = (adds.len(), deletes.len());
        for meta in deletes.into_values() {
            self.outbound.submit(EventAnnounce::FileDeleted(meta));
        }
        for meta in adds.into_values() {
            self.outbound.submit(EventAnnounce::FileAdded(meta));
        }

        debug!(added, deleted, "sync round applied");
        Ok(SyncOutcome::Synced { added, deleted })
    }
}

/// Fold per-peer deltas into one last-writer-wins view: live records and
/// tombstones each deduplicate per id, then conflicts between the two
/// sets resolve by timestamp with ties going to the tombstone.
fn reconcile(
    added: FileMetaList,
    deleted: FileMetaList,
) -> (HashMap<String, FileMeta>, HashMap<String, FileMeta>) {
    let mut adds: HashMap<String, FileMeta> = HashMap::new();
    let mut deletes: HashMap<String, FileMeta> = HashMap::new();

    for meta in added.into_iter().chain(deleted) {
        let set = if meta.is_deleted {
            &mut deletes
        } else {
            &mut adds
        };
        match set.entry(meta.id.clone()) {
            Entry::Occupied(mut slot) => {
                if meta.supersedes(slot.get()) {
                    slot.insert(meta);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(meta);
            }
        }
    }

    deletes.retain(|id, tombstone| {
        let add_wins = match adds.get(id) {
            Some(add) => add.supersedes(tombstone),
            None => return true,
        };
        if add_wins {
            false
        } else {
            adds.remove(id);
            true
        }
    });

    (adds, deletes)
}

/// Startup loop: wait out the grace period, then run rounds until one
/// succeeds. Failed rounds retry on the configured interval.
pub(crate) fn spawn_startup(
    engine: Arc<SyncEngine>,
    grace: Duration,
    retry: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        loop {
            match engine.run_round().await {
                Ok(outcome) => {
                    debug!(?outcome, "initial sync finished");
                    break;
                }
                Err(err) => warn!(error = %err, "sync round failed"),
            }
            tokio::time::sleep(retry).await;
        }
    })
}
