//! bisync-core: Two-root bidirectional sync engine
//!
//! Provides content hashing, the persisted snapshot, watcher event
//! translation, last-writer-wins reconciliation, and the startup scan.

pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod hash;
pub mod remote;
pub mod root;
pub mod scan;
pub mod snapshot;
pub mod suppress;
pub mod watch;

pub use config::{CONFIG_FILE, SyncConfig};
pub use daemon::{SyncDaemon, open_engine};
pub use engine::{Outcome, SyncEngine, Worker};
pub use error::{Result, SyncError};
pub use event::{EventKind, Origin, SyncEvent};
pub use filter::PathFilter;
pub use hash::ContentHash;
pub use remote::{LocalDirRemote, RemoteMeta, RemoteOps};
pub use scan::{InitialScanner, ScanReport};
pub use snapshot::{SnapshotEntry, SnapshotStore};
pub use suppress::SuppressionRegistry;
pub use watch::RootWatcher;
