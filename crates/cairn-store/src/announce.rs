//! Inbound and outbound announce worker pools.
//!
//! Inbound workers dispatch cluster events to the caller-supplied
//! handler; the journal is never mutated from here, so an announce storm
//! cannot amplify itself. Outbound workers fan each event out to every
//! peer in parallel, and partial delivery counts as success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, warn};

use cairn_cluster::{ClusterManager, ClusterResult, EventAnnounce};
use cairn_journal::FileMeta;

/// Worker feed shared by one pool.
pub(crate) type SharedFeed = Arc<Mutex<mpsc::Receiver<EventAnnounce>>>;

/// Wrap a pump feed for a worker pool.
pub(crate) fn shared_feed(feed: mpsc::Receiver<EventAnnounce>) -> SharedFeed {
    Arc::new(Mutex::new(feed))
}

/// Caller-supplied sink for inbound announces.
///
/// File events are informational: recording them in the journal is the
/// sync engine's and write path's job. The `file_added` seam is also
/// where replication hooks in — the sync engine replays missing
/// full-consistency objects through it.
#[async_trait]
pub trait AnnounceHandler: Send + Sync {
    /// An object was written somewhere in the cluster.
    async fn file_added(&self, meta: &FileMeta) {
        debug!(id = %meta.id, ts = meta.timestamp_us, "file added in cluster");
    }

    /// An object was tombstoned somewhere in the cluster.
    async fn file_deleted(&self, meta: &FileMeta) {
        debug!(id = %meta.id, ts = meta.timestamp_us, "file deleted in cluster");
    }

    /// A pass-through cluster message arrived.
    async fn opaque(&self, data: &[u8]) {
        debug!(len = data.len(), "opaque cluster message");
    }
}

/// The default handler: logs every event and does nothing else.
#[derive(Debug, Default)]
pub struct LogHandler;

#[async_trait]
impl AnnounceHandler for LogHandler {}

async fn dispatch_inbound(handler: &dyn AnnounceHandler, event: &EventAnnounce) {
    match event {
        EventAnnounce::FileAdded(meta) => handler.file_added(meta).await,
        EventAnnounce::FileDeleted(meta) => handler.file_deleted(meta).await,
        EventAnnounce::Opaque(data) => handler.opaque(data).await,
        // The pump consumes the sentinel; it never reaches a worker.
        EventAnnounce::Stop => {}
    }
}

/// Start the inbound pool. Workers exit when the feed closes.
pub(crate) fn spawn_inbound_workers(
    count: usize,
    feed: SharedFeed,
    handler: Arc<dyn AnnounceHandler>,
    handle_timeout: Duration,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let feed = feed.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    let event = { feed.lock().await.recv().await };
                    let Some(event) = event else { break };
                    if timeout(handle_timeout, dispatch_inbound(handler.as_ref(), &event))
                        .await
                        .is_err()
                    {
                        warn!(worker, "inbound announce handling timed out");
                    }
                }
            })
        })
        .collect()
}

/// Start the outbound pool. Workers exit when the feed closes.
pub(crate) fn spawn_outbound_workers(
    count: usize,
    feed: SharedFeed,
    cluster: Arc<dyn ClusterManager>,
    node_id: String,
    announce_timeout: Duration,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let feed = feed.clone();
            let cluster = cluster.clone();
            let node_id = node_id.clone();
            tokio::spawn(async move {
                loop {
                    let event = { feed.lock().await.recv().await };
                    let Some(event) = event else { break };
                    if let Err(err) =
                        broadcast(&cluster, &node_id, event, announce_timeout).await
                    {
                        warn!(error = %err, "emitting announce failed");
                    }
                }
            })
        })
        .collect()
}

/// Deliver one event to every peer but `node_id`, in parallel, each
/// delivery under its own deadline. Failed peers are logged and skipped.
pub(crate) async fn broadcast(
    cluster: &Arc<dyn ClusterManager>,
    node_id: &str,
    event: EventAnnounce,
    deadline: Duration,
) -> ClusterResult<()> {
    let nodes = cluster.list_nodes().await?;
    let mut deliveries = JoinSet::new();
    for node in nodes {
        if node.id == node_id {
            continue;
        }
        let cluster = Arc::clone(cluster);
        let event = event.clone();
        deliveries.spawn(async move {
            match timeout(deadline, cluster.announce(&node.id, event)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(peer = %node.id, error = %err, "announce error"),
                Err(_) => warn!(peer = %node.id, "announce timed out"),
            }
        });
    }
    while deliveries.join_next().await.is_some() {}
    Ok(())
}
