#![warn(missing_docs)]

//! cairn store: the coordination engine each node runs.
//!
//! The engine ties the local byte area, the journal set, the remote
//! bucket, and the cluster membership together: it reconciles journals
//! with peers at startup, keeps announces flowing without ever blocking
//! a caller, branches writes on their consistency level, and serves
//! reads from wherever in the cluster the bytes happen to be.

pub mod announce;
pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod sync;

mod consolidate;
mod pump;
mod state;

pub use announce::{AnnounceHandler, LogHandler};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use store::{check_node_id, GetOutcome, Store, StoreBuilder};
pub use sync::SyncOutcome;
