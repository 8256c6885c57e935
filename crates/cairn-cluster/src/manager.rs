//! Cluster membership and the peer RPC seam.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cairn_journal::FileMetaList;
use cairn_storage::ByteStream;

use crate::error::{ClusterError, ClusterResult};
use crate::event::EventAnnounce;

/// Descriptor of one cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identifier.
    pub id: String,
}

impl NodeInfo {
    /// Create a descriptor for the given node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Peer membership and RPC interface the coordination engine drives.
///
/// Membership is authoritative here; callers re-list nodes on every
/// operation instead of caching the view.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// Current cluster membership, the local node included.
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>>;
    /// Deliver an event announce to one peer.
    async fn announce(&self, peer: &str, event: EventAnnounce) -> ClusterResult<()>;
    /// Exchange journal snapshots with one peer. Given our flat union,
    /// the peer answers with the records it holds that we are missing or
    /// outdated on, split into live records and tombstones.
    async fn sync(
        &self,
        peer: &str,
        list: FileMetaList,
    ) -> ClusterResult<(FileMetaList, FileMetaList)>;
    /// Stream an object's bytes from one peer's local byte area.
    async fn get_object(&self, peer: &str, id: &str) -> ClusterResult<ByteStream>;
}

/// Scripted in-memory cluster for tests: membership, sync answers, and
/// peer-held objects are all preset, and every announce and object
/// request is recorded.
#[derive(Default)]
pub struct StubCluster {
    nodes: Mutex<Vec<NodeInfo>>,
    sync_responses: Mutex<HashMap<String, (FileMetaList, FileMetaList)>>,
    sync_failures: Mutex<HashMap<String, String>>,
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    announced: Mutex<Vec<(String, EventAnnounce)>>,
    object_requests: Mutex<Vec<(String, String)>>,
}

impl StubCluster {
    /// Create a stub with no members at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the membership view.
    pub fn set_nodes(&self, ids: &[&str]) {
        *self.nodes.lock().unwrap() = ids.iter().map(|id| NodeInfo::new(*id)).collect();
    }

    /// Script the answer `peer` gives to a sync exchange.
    pub fn set_sync_response(&self, peer: &str, added: FileMetaList, deleted: FileMetaList) {
        self.sync_responses
            .lock()
            .unwrap()
            .insert(peer.to_string(), (added, deleted));
    }

    /// Make sync exchanges with `peer` fail in transit.
    pub fn fail_sync(&self, peer: &str, reason: &str) {
        self.sync_failures
            .lock()
            .unwrap()
            .insert(peer.to_string(), reason.to_string());
    }

    /// Seed an object held by `peer`.
    pub fn put_peer_object(&self, peer: &str, id: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((peer.to_string(), id.to_string()), bytes.to_vec());
    }

    /// Every announce delivered so far, in delivery order.
    pub fn announced(&self) -> Vec<(String, EventAnnounce)> {
        self.announced.lock().unwrap().clone()
    }

    /// Every `(peer, id)` object request made so far.
    pub fn object_requests(&self) -> Vec<(String, String)> {
        self.object_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterManager for StubCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<NodeInfo>> {
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn announce(&self, peer: &str, event: EventAnnounce) -> ClusterResult<()> {
        debug!(peer = %peer, "announce delivered");
        self.announced
            .lock()
            .unwrap()
            .push((peer.to_string(), event));
        Ok(())
    }

    async fn sync(
        &self,
        peer: &str,
        _list: FileMetaList,
    ) -> ClusterResult<(FileMetaList, FileMetaList)> {
        if let Some(reason) = self.sync_failures.lock().unwrap().get(peer) {
            return Err(ClusterError::Transport(reason.clone()));
        }
        Ok(self
            .sync_responses
            .lock()
            .unwrap()
            .get(peer)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_object(&self, peer: &str, id: &str) -> ClusterResult<ByteStream> {
        self.object_requests
            .lock()
            .unwrap()
            .push((peer.to_string(), id.to_string()));
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&(peer.to_string(), id.to_string()))
            .cloned()
            .ok_or(ClusterError::NotFound)?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }
}
