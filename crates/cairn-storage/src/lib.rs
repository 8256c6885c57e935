#![warn(missing_docs)]

//! cairn storage subsystem: the local byte area a node serves objects
//! from, and the remote bucket objects can be offloaded to.
//!
//! Both backends are trait seams; the coordination engine only ever asks
//! for reads, writes, and removals by object id.

pub mod error;
pub mod local;
pub mod remote;

pub use error::{StorageError, StorageResult};
pub use local::{check_object_id, ByteStream, DirStorage, DiskStats, LocalStorage, MemoryStorage};
pub use remote::{MemoryRemote, RemoteConfig, RemoteStorage, Spec};
