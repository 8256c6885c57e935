//! The per-node store: construction, read/write paths, and lifecycle.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use cairn_cluster::{ClusterError, ClusterManager, EventAnnounce};
use cairn_journal::{
    ConsistencyLevel, FileMeta, FileMetaList, Journal, JournalError, JournalManager,
};
use cairn_storage::{check_object_id, ByteStream, DiskStats, LocalStorage, RemoteStorage, StorageError};

use crate::announce::{
    shared_feed, spawn_inbound_workers, spawn_outbound_workers, AnnounceHandler, LogHandler,
};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::consolidate::Consolidator;
use crate::error::{StoreError, StoreResult};
use crate::pump::AnnouncePump;
use crate::state::StateCell;
use crate::sync::{self, SyncEngine, SyncOutcome};

/// Validate a node id at the construction boundary: non-empty, no path
/// separators, no parent references.
pub fn check_node_id(id: &str) -> StoreResult<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(StoreError::Config(format!("invalid node id: {id:?}")));
    }
    Ok(())
}

/// Result of a local object lookup.
pub enum GetOutcome {
    /// The bytes are served from the local byte area.
    Found {
        /// Object byte stream.
        stream: ByteStream,
        /// The journal record for the object.
        meta: FileMeta,
    },
    /// The journal records the object, but the bytes are not here.
    NotLocal {
        /// The journal record for the object.
        meta: FileMeta,
    },
    /// No journal records the object.
    Unknown,
}

/// Builder for a [`Store`]; collaborators are handed to [`build`].
///
/// [`build`]: StoreBuilder::build
pub struct StoreBuilder {
    node_id: String,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    handler: Arc<dyn AnnounceHandler>,
}

impl StoreBuilder {
    /// Start building a store for the given node id.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            config: StoreConfig::default(),
            clock: Arc::new(SystemClock),
            handler: Arc::new(LogHandler),
        }
    }

    /// Replace the default configuration.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the wall clock, usually with a manual one in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the inbound announce handler.
    pub fn handler(mut self, handler: Arc<dyn AnnounceHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Validate the configuration, probe the storage backends, create
    /// the owning journal, and start the pumps, worker pools, sync loop,
    /// and consolidation loop.
    pub async fn build(
        self,
        local: Arc<dyn LocalStorage>,
        remote: Arc<dyn RemoteStorage>,
        journals: Arc<JournalManager>,
        cluster: Arc<dyn ClusterManager>,
    ) -> StoreResult<Store> {
        check_node_id(&self.node_id)?;
        local
            .check_access("")
            .await
            .map_err(|err| StoreError::Access(format!("local storage: {err}")))?;
        remote
            .check_access("")
            .await
            .map_err(|err| StoreError::Access(format!("remote storage: {err}")))?;
        journals.create(&self.node_id).await?;

        let state = Arc::new(StateCell::new());
        let debug_flag = Arc::new(AtomicBool::new(false));

        let (inbound, inbound_feed) = AnnouncePump::new(self.config.feed_capacity);
        let (outbound, outbound_feed) = AnnouncePump::new(self.config.feed_capacity);
        let inbound_workers = spawn_inbound_workers(
            self.config.inbound_workers,
            shared_feed(inbound_feed),
            self.handler.clone(),
            self.config.handle_timeout,
        );
        let outbound_workers = spawn_outbound_workers(
            self.config.outbound_workers,
            shared_feed(outbound_feed),
            cluster.clone(),
            self.node_id.clone(),
            self.config.announce_timeout,
        );

        let engine = Arc::new(SyncEngine::new(
            self.node_id.clone(),
            self.config.clone(),
            state.clone(),
            journals.clone(),
            local.clone(),
            cluster.clone(),
            inbound.handle(),
            outbound.handle(),
        ));
        let sync_loop = sync::spawn_startup(
            engine.clone(),
            self.config.sync_grace,
            self.config.sync_retry,
        );
        let consolidation = Consolidator {
            node_id: self.node_id.clone(),
            journals: journals.clone(),
            state: state.clone(),
            debug: debug_flag.clone(),
            interval: self.config.consolidate_interval,
            ready_poll: self.config.ready_poll,
        }
        .spawn();

        Ok(Store {
            node_id: self.node_id,
            debug: debug_flag,
            state,
            local,
            remote,
            journals,
            cluster,
            clock: self.clock,
            engine,
            inbound,
            outbound,
            inbound_workers: Mutex::new(inbound_workers),
            outbound_workers: Mutex::new(outbound_workers),
            background: Mutex::new(vec![sync_loop, consolidation]),
        })
    }
}

/// One node's coordination engine over its local byte area, journals,
/// remote bucket, and cluster peers.
pub struct Store {
    node_id: String,
    debug: Arc<AtomicBool>,
    state: Arc<StateCell>,
    local: Arc<dyn LocalStorage>,
    remote: Arc<dyn RemoteStorage>,
    journals: Arc<JournalManager>,
    cluster: Arc<dyn ClusterManager>,
    clock: Arc<dyn Clock>,
    engine: Arc<SyncEngine>,
    inbound: AnnouncePump,
    outbound: AnnouncePump,
    inbound_workers: Mutex<Vec<JoinHandle<()>>>,
    outbound_workers: Mutex<Vec<JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Store {
    /// Start building a store for the given node id.
    pub fn builder(node_id: impl Into<String>) -> StoreBuilder {
        StoreBuilder::new(node_id)
    }

    /// This node's id, which is also the name of its owning journal.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// True once the initial sync round has completed. Advisory only:
    /// no entry point is gated on it.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Toggle verbose diagnostics in the background loops.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Accept an announce from a peer. Never blocks; the sentinel used
    /// internally for shutdown is silently ignored.
    pub fn receive_event_announce(&self, event: EventAnnounce) {
        if matches!(event, EventAnnounce::Stop) {
            return;
        }
        self.inbound.submit(event);
    }

    /// Queue an announce for delivery to every peer. Never blocks; the
    /// shutdown sentinel is silently ignored.
    pub fn emit_event_announce(&self, event: EventAnnounce) {
        if matches!(event, EventAnnounce::Stop) {
            return;
        }
        self.outbound.submit(event);
    }

    /// Usage counters of the local byte area.
    pub async fn disk_stats(&self) -> StoreResult<DiskStats> {
        self.local.disk_stats().await.map_err(StoreError::Local)
    }

    /// Run one reconciliation round immediately. The startup round runs
    /// on its own schedule; this is the explicit re-sync trigger.
    pub async fn sync_now(&self) -> StoreResult<SyncOutcome> {
        self.engine.run_round().await
    }

    /// First journal record for `id`, scanning journals in owner order.
    /// Tombstones are returned as-is.
    pub async fn head_object(&self, id: &str) -> StoreResult<Option<FileMeta>> {
        let mut found = None;
        self.journals
            .for_each(|_, journal| {
                if let Some(meta) = journal.get(id) {
                    found = Some(meta.clone());
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            })
            .await;
        Ok(found)
    }

    /// Look `id` up in the local byte area. Peers use this to pull
    /// objects from us; [`find_object`] is the cluster-wide read.
    ///
    /// [`find_object`]: Store::find_object
    pub async fn get_object(&self, id: &str) -> StoreResult<GetOutcome> {
        let Some(meta) = self.head_object(id).await? else {
            return Ok(GetOutcome::Unknown);
        };
        if meta.is_deleted {
            return Ok(GetOutcome::Unknown);
        }
        if meta.is_symlink {
            return Ok(GetOutcome::NotLocal { meta });
        }
        match self.local.read(id).await {
            Ok(stream) => Ok(GetOutcome::Found { stream, meta }),
            Err(StorageError::NotFound { .. }) => {
                warn!(id = %id, "journal records local bytes the disk does not have");
                Ok(GetOutcome::NotLocal { meta })
            }
            Err(err) => Err(StoreError::Local(err)),
        }
    }

    /// Read `id` from anywhere in the cluster: locally if possible,
    /// otherwise from whichever peer answers first. Peers that report
    /// not-found are expected; the laggards are cancelled once one
    /// stream is in hand.
    pub async fn find_object(&self, id: &str) -> StoreResult<(ByteStream, FileMeta)> {
        let meta = match self.get_object(id).await? {
            GetOutcome::Found { stream, meta } => return Ok((stream, meta)),
            GetOutcome::NotLocal { meta } => meta,
            GetOutcome::Unknown => return Err(StoreError::NotFound),
        };

        let nodes = self.cluster.list_nodes().await?;
        if nodes.len() < 2 {
            return Err(StoreError::NotFound);
        }

        let mut requests = JoinSet::new();
        for node in nodes {
            if node.id == self.node_id {
                continue;
            }
            let cluster = Arc::clone(&self.cluster);
            let id = id.to_string();
            requests.spawn(async move {
                let peer = node.id;
                let answer = cluster.get_object(&peer, &id).await;
                (peer, answer)
            });
        }
        while let Some(joined) = requests.join_next().await {
            let Ok((peer, answer)) = joined else { continue };
            match answer {
                Ok(stream) => {
                    debug!(id = %id, peer = %peer, "object served by peer");
                    return Ok((stream, meta));
                }
                Err(ClusterError::NotFound) => {}
                Err(err) => warn!(id = %id, peer = %peer, error = %err, "peer read failed"),
            }
        }
        Err(StoreError::NotFound)
    }

    /// Pull `id` from the remote bucket on a total cluster miss. The
    /// bytes are written through to the local area, recorded in the
    /// owning journal under `Remote` consistency, and announced, so the
    /// fetched object afterwards behaves like a written one.
    pub async fn fetch_object(&self, id: &str) -> StoreResult<(ByteStream, FileMeta)> {
        let spec = match self.remote.get_object(id, None).await {
            Ok(spec) => spec,
            Err(StorageError::NotFound { .. }) => return Err(StoreError::NotFound),
            Err(err) => return Err(StoreError::Remote(err)),
        };
        let Some(body) = spec.body else {
            warn!(id = %id, "remote returned an object without a body");
            return Err(StoreError::NotFound);
        };

        let written = self.local.write(id, body).await.map_err(StoreError::Local)?;
        let meta = FileMeta {
            name: spec.meta.get("name").cloned(),
            size: written,
            timestamp_us: self.clock.now_us(),
            ..FileMeta::new(id, ConsistencyLevel::Remote)
        };
        self.record_owned(&meta).await?;
        self.emit_event_announce(EventAnnounce::FileAdded(meta.clone()));

        let stream = self.local.read(id).await.map_err(StoreError::Local)?;
        Ok((stream, meta))
    }

    /// Store an object. The record needs at least an id and a
    /// consistency level; a zero timestamp is stamped from the clock.
    /// Returns the number of bytes written locally.
    pub async fn put_object(&self, body: ByteStream, meta: FileMeta) -> StoreResult<u64> {
        check_object_id(&meta.id).map_err(|err| StoreError::Config(err.to_string()))?;

        let mut meta = meta;
        if meta.timestamp_us == 0 {
            meta.timestamp_us = self.clock.now_us();
        }
        meta.is_symlink = false;
        meta.is_deleted = false;

        let written = self
            .local
            .write(&meta.id, body)
            .await
            .map_err(StoreError::Local)?;
        meta.size = written;

        self.record_owned(&meta).await?;
        self.emit_event_announce(EventAnnounce::FileAdded(meta.clone()));

        match meta.consistency {
            ConsistencyLevel::Local => {}
            ConsistencyLevel::Remote | ConsistencyLevel::Full => {
                // Upload from the persisted copy so the stream cannot
                // change under the transfer.
                let body = self
                    .local
                    .read(&meta.id)
                    .await
                    .map_err(StoreError::Local)?;
                let mut upload_meta = HashMap::new();
                if let Some(name) = &meta.name {
                    upload_meta.insert("name".to_string(), name.clone());
                }
                self.remote
                    .put_object(&meta.id, body, &upload_meta)
                    .await
                    .map_err(StoreError::Remote)?;
            }
        }
        Ok(written)
    }

    /// Compare an external journal snapshot against the local union.
    /// Returns the records the external side has that we are missing or
    /// outdated on, split into live records and tombstones.
    pub async fn diff(&self, list: FileMetaList) -> StoreResult<(FileMetaList, FileMetaList)> {
        let local = Journal::from_list(self.journals.export_all().await);
        let external = Journal::from_list(list);
        Ok(external.diff(&local))
    }

    /// Shut down: both pumps drain and close their feeds, the worker
    /// pools exit once drained, and the background loops stop. Announces
    /// submitted after close are dropped silently.
    pub fn close(&self) {
        self.inbound.stop();
        self.outbound.stop();
        for task in self.background.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    /// Wait for the inbound workers to finish, up to `timeout`. Returns
    /// without error even if they are still running.
    pub async fn wait_inbound(&self, timeout: Duration) {
        Self::join_workers(&self.inbound_workers, timeout).await;
    }

    /// Wait for the outbound workers to finish, up to `timeout`.
    pub async fn wait_outbound(&self, timeout: Duration) {
        Self::join_workers(&self.outbound_workers, timeout).await;
    }

    async fn join_workers(workers: &Mutex<Vec<JoinHandle<()>>>, deadline: Duration) {
        let handles: Vec<_> = workers.lock().unwrap().drain(..).collect();
        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        let _ = tokio::time::timeout(deadline, join_all).await;
    }

    /// Record `meta` in the owning journal and drop the id from every
    /// other journal, in one mutation.
    async fn record_owned(&self, meta: &FileMeta) -> StoreResult<()> {
        let mut seen_own = false;
        self.journals
            .for_each_update(|owner, journal| {
                if owner == self.node_id {
                    seen_own = true;
                    journal.set(meta.clone());
                } else {
                    journal.delete(&meta.id);
                }
                Ok(())
            })
            .await?;
        if !seen_own {
            return Err(StoreError::Journal(JournalError::UnknownJournal {
                owner: self.node_id.clone(),
            }));
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}
