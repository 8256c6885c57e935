//! The cluster message envelope.

use cairn_journal::FileMeta;
use serde::{Deserialize, Serialize};

/// A small cluster message describing a file event or an opaque payload.
///
/// `Stop` is the worker-pool shutdown sentinel; it never travels between
/// nodes and the public receive/emit entry points silently drop it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventAnnounce {
    /// An object was written somewhere in the cluster.
    FileAdded(FileMeta),
    /// An object was tombstoned somewhere in the cluster.
    FileDeleted(FileMeta),
    /// Pass-through payload for upper layers.
    Opaque(Vec<u8>),
    /// Internal shutdown sentinel.
    Stop,
}

impl EventAnnounce {
    /// The file metadata carried by this event, when it is a file event.
    pub fn file_meta(&self) -> Option<&FileMeta> {
        match self {
            Self::FileAdded(meta) | Self::FileDeleted(meta) => Some(meta),
            _ => None,
        }
    }
}
