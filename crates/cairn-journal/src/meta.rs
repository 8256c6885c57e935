//! Object metadata records and the last-writer-wins ordering law.

use serde::{Deserialize, Serialize};

/// Durability policy an object was written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    /// Bytes live on the writing node only.
    Local,
    /// Bytes live on the writing node and in the remote bucket.
    Remote,
    /// As `Remote`, plus every node in the cluster pulls its own replica.
    Full,
}

/// One object as recorded by one writer's journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Unique object identifier.
    pub id: String,
    /// Optional human-readable name; drives MIME inference on upload.
    pub name: Option<String>,
    /// Object size in bytes.
    pub size: u64,
    /// Write timestamp in microseconds since the Unix epoch.
    pub timestamp_us: u64,
    /// Durability policy for this object.
    pub consistency: ConsistencyLevel,
    /// True when the bytes live on another node or in the remote bucket.
    pub is_symlink: bool,
    /// Tombstone flag.
    pub is_deleted: bool,
}

impl FileMeta {
    /// Create a record with everything but the id and policy zeroed.
    pub fn new(id: impl Into<String>, consistency: ConsistencyLevel) -> Self {
        Self {
            id: id.into(),
            name: None,
            size: 0,
            timestamp_us: 0,
            consistency,
            is_symlink: false,
            is_deleted: false,
        }
    }

    /// Create a tombstone for `id` at the given timestamp.
    pub fn tombstone(id: impl Into<String>, timestamp_us: u64) -> Self {
        Self {
            id: id.into(),
            name: None,
            size: 0,
            timestamp_us,
            consistency: ConsistencyLevel::Local,
            is_symlink: false,
            is_deleted: true,
        }
    }

    /// Last-writer-wins ordering: the greater timestamp prevails, and a
    /// tombstone wins a timestamp tie against a live record.
    pub fn supersedes(&self, other: &FileMeta) -> bool {
        if self.timestamp_us != other.timestamp_us {
            return self.timestamp_us > other.timestamp_us;
        }
        self.is_deleted && !other.is_deleted
    }
}

/// Flat list of metadata records, the shape journals are exchanged in.
pub type FileMetaList = Vec<FileMeta>;

/// Generate a fresh object or node identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
