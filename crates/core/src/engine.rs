//! Event reconciliation and the sync worker
//!
//! Every event is resolved against the current state of both roots, not
//! against what the event claims. Conflicts are last-writer-wins by mtime;
//! on an exact tie the side that produced the event wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{Result, SyncError};
use crate::event::{EventKind, EventReceiver, Origin, Recv, SyncEvent};
use crate::filter::PathFilter;
use crate::hash::ContentHash;
use crate::remote::{RemoteMeta, RemoteOps};
use crate::root::{FileStat, Root};
use crate::snapshot::{SnapshotEntry, SnapshotStore};
use crate::suppress::SuppressionRegistry;

/// What handling a single event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Uploaded,
    Downloaded,
    DeletedRemote,
    DeletedLocal,
    MovedRemote,
    MovedLocal,
    /// Both sides already hold the same content
    InSync,
    /// Only the snapshot changed
    SnapshotOnly,
    /// The path was recently written by the engine itself
    Suppressed,
    /// Outside the root or excluded by the filter
    Ignored,
    /// The path no longer exists on the side that reported it
    Stale,
}

/// Shared state for reconciling the local root with a remote
pub struct SyncEngine {
    local: Root,
    remote: Arc<dyn RemoteOps>,
    snapshot: SnapshotStore,
    suppression: SuppressionRegistry,
    filter: PathFilter,
}

impl SyncEngine {
    /// Build an engine. If the snapshot file lives inside either root it is
    /// added to the filter so it never syncs.
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote: Arc<dyn RemoteOps>,
        snapshot: SnapshotStore,
        suppression: SuppressionRegistry,
        filter: PathFilter,
    ) -> Self {
        let local = Root::new(local_root);
        let mut filter = filter;
        for rel in [
            local.relative(snapshot.path()),
            remote.relativize(snapshot.path()),
        ]
        .into_iter()
        .flatten()
        {
            debug!("Excluding snapshot file {rel} from sync");
            filter = filter.exclude_file(&rel);
        }

        Self {
            local,
            remote,
            snapshot,
            suppression,
            filter,
        }
    }

    #[must_use]
    pub fn local(&self) -> &Root {
        &self.local
    }

    #[must_use]
    pub fn remote(&self) -> &dyn RemoteOps {
        self.remote.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    #[must_use]
    pub fn suppression(&self) -> &SuppressionRegistry {
        &self.suppression
    }

    #[must_use]
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Handle one event, logging failures instead of returning them.
    ///
    /// Returns `None` if the event failed. Vanished files are expected under
    /// churn and only logged at debug level.
    pub fn process(&self, event: &SyncEvent) -> Option<Outcome> {
        match self.handle(event) {
            Ok(outcome) => {
                debug!(
                    "{} {:?} {} -> {outcome:?}",
                    event.origin,
                    event.kind,
                    event.src.display()
                );
                Some(outcome)
            }
            Err(e) if e.is_vanished() => {
                debug!("Dropping stale {} event: {e}", event.origin);
                None
            }
            Err(e) => {
                warn!("Failed to sync {} {:?} event: {e}", event.origin, event.kind);
                None
            }
        }
    }

    /// Reconcile one event against the current state of both roots
    ///
    /// # Errors
    /// Returns [`SyncError::MalformedEvent`] for a move without a destination,
    /// and I/O or remote errors from the operations it performs.
    pub fn handle(&self, event: &SyncEvent) -> Result<Outcome> {
        if event.kind == EventKind::Moved {
            let Some(dst) = &event.dst else {
                return Err(SyncError::MalformedEvent {
                    path: event.src.clone(),
                    reason: "move without a destination".to_string(),
                });
            };
            return self.handle_move(event.origin, &event.src, dst);
        }

        if self.suppression.is_suppressed(&event.src) {
            debug!("Suppressed self-write {}", event.src.display());
            return Ok(Outcome::Suppressed);
        }
        let Some(rel) = self.tracked(event.origin, &event.src) else {
            return Ok(Outcome::Ignored);
        };

        match (event.kind, event.origin) {
            (EventKind::Deleted, Origin::Local) => self.local_deleted(&rel),
            (EventKind::Deleted, Origin::Remote) => self.remote_deleted(&rel),
            (_, origin) => self.reconcile(origin, &rel),
        }
    }

    /// Reconcile the content of `rel` as if `origin` had just changed it.
    /// Bypasses suppression; used by the initial scan.
    ///
    /// # Errors
    /// Returns I/O or remote errors from hashing and copying.
    pub fn reconcile(&self, origin: Origin, rel: &str) -> Result<Outcome> {
        match origin {
            Origin::Local => self.local_changed(rel),
            Origin::Remote => self.remote_changed(rel),
        }
    }

    fn handle_move(&self, origin: Origin, src: &Path, dst: &Path) -> Result<Outcome> {
        if self.suppression.is_suppressed(src) || self.suppression.is_suppressed(dst) {
            debug!("Suppressed self-move {} -> {}", src.display(), dst.display());
            return Ok(Outcome::Suppressed);
        }
        let (Some(src_rel), Some(dst_rel)) = (self.tracked(origin, src), self.tracked(origin, dst))
        else {
            return Ok(Outcome::Ignored);
        };

        match origin {
            Origin::Local => self.local_moved(&src_rel, &dst_rel),
            Origin::Remote => self.remote_moved(&src_rel, &dst_rel),
        }
    }

    /// Relative key of `path` on the given side, if it takes part in sync
    fn tracked(&self, origin: Origin, path: &Path) -> Option<String> {
        let rel = match origin {
            Origin::Local => self.local.relative(path),
            Origin::Remote => self.remote.relativize(path),
        }?;
        (!self.filter.is_ignored(&rel, false)).then_some(rel)
    }

    fn local_changed(&self, rel: &str) -> Result<Outcome> {
        let path = self.local.resolve(rel);
        let Some(stat) = self.local.stat(rel)? else {
            return Ok(Outcome::Stale);
        };
        let hash = ContentHash::from_file(&path)?;
        self.snapshot.set(rel, SnapshotEntry::new(stat, hash))?;

        match self.remote.meta(rel)? {
            None => {
                self.upload(rel, &path)?;
                Ok(Outcome::Uploaded)
            }
            Some(remote) if remote.hash == hash => Ok(Outcome::InSync),
            Some(remote) => {
                if newer_side(stat.mtime, remote.mtime, Origin::Local) == Origin::Local {
                    self.upload(rel, &path)?;
                    Ok(Outcome::Uploaded)
                } else {
                    self.download(rel, &remote)?;
                    Ok(Outcome::Downloaded)
                }
            }
        }
    }

    fn remote_changed(&self, rel: &str) -> Result<Outcome> {
        let Some(remote) = self.remote.meta(rel)? else {
            return Ok(Outcome::Stale);
        };
        let Some(stat) = self.local.stat(rel)? else {
            self.download(rel, &remote)?;
            return Ok(Outcome::Downloaded);
        };

        let path = self.local.resolve(rel);
        let hash = ContentHash::from_file(&path)?;
        if hash == remote.hash {
            self.snapshot.set(rel, SnapshotEntry::new(stat, hash))?;
            return Ok(Outcome::InSync);
        }

        if newer_side(stat.mtime, remote.mtime, Origin::Remote) == Origin::Remote {
            self.download(rel, &remote)?;
            Ok(Outcome::Downloaded)
        } else {
            self.upload(rel, &path)?;
            self.snapshot.set(rel, SnapshotEntry::new(stat, hash))?;
            Ok(Outcome::Uploaded)
        }
    }

    fn local_deleted(&self, rel: &str) -> Result<Outcome> {
        // Deleted and recreated before we got here: sync the new content
        if self.local.is_file(rel) {
            return self.local_changed(rel);
        }
        if !self.remote.exists(rel) {
            // A whole directory went away in one notification
            let children = self.snapshot.keys_under(rel);
            if !children.is_empty() {
                for child in &children {
                    self.local_deleted(child)?;
                }
                return Ok(Outcome::DeletedRemote);
            }
        }
        let outcome = if self.remote.exists(rel) {
            let path = self.remote.delete(rel)?;
            self.suppression.mark_self_write(&path);
            Outcome::DeletedRemote
        } else {
            Outcome::SnapshotOnly
        };
        self.snapshot.remove(rel)?;
        Ok(outcome)
    }

    fn remote_deleted(&self, rel: &str) -> Result<Outcome> {
        if self.remote.exists(rel) {
            return self.remote_changed(rel);
        }
        if !self.local.is_file(rel) {
            let children = self.snapshot.keys_under(rel);
            if !children.is_empty() {
                for child in &children {
                    self.remote_deleted(child)?;
                }
                return Ok(Outcome::DeletedLocal);
            }
        }
        let outcome = if self.local.is_file(rel) {
            let path = self.local.remove_file(rel)?;
            self.suppression.mark_self_write(&path);
            info!("[LOCAL DELETE] {rel}");
            Outcome::DeletedLocal
        } else {
            Outcome::SnapshotOnly
        };
        self.snapshot.remove(rel)?;
        Ok(outcome)
    }

    fn local_moved(&self, src: &str, dst: &str) -> Result<Outcome> {
        if self.remote.exists(src) {
            let dest = self.remote.rename(src, dst)?;
            self.suppression.mark_self_write(&dest);
            self.suppression.mark_self_write(&self.remote.locate(src));
            self.snapshot.rename(src, dst)?;
            return Ok(Outcome::MovedRemote);
        }

        self.snapshot.rename(src, dst)?;
        if self.local.is_file(dst) {
            self.local_changed(dst)
        } else {
            Ok(Outcome::SnapshotOnly)
        }
    }

    fn remote_moved(&self, src: &str, dst: &str) -> Result<Outcome> {
        if self.local.is_file(src) {
            let dest = self.local.rename(src, dst)?;
            self.suppression.mark_self_write(&dest);
            self.suppression.mark_self_write(&self.local.resolve(src));
            info!("[LOCAL MOVE] {src} -> {dst}");
            self.snapshot.rename(src, dst)?;
            return Ok(Outcome::MovedLocal);
        }

        self.snapshot.rename(src, dst)?;
        if self.remote.exists(dst) {
            self.remote_changed(dst)
        } else {
            Ok(Outcome::SnapshotOnly)
        }
    }

    fn upload(&self, rel: &str, path: &Path) -> Result<()> {
        let dest = self.remote.put(rel, path)?;
        self.suppression.mark_self_write(&dest);
        Ok(())
    }

    /// Pull `rel` and record it in the snapshot under the remote hash
    fn download(&self, rel: &str, remote: &RemoteMeta) -> Result<()> {
        let dest = self.local.resolve(rel);
        // Mark first: the local watcher may report the write before `get` returns
        self.suppression.mark_self_write(&dest);
        self.remote.get(rel, &dest)?;
        self.suppression.mark_self_write(&dest);

        let stat = self.local.stat(rel)?.unwrap_or(FileStat {
            size: remote.size,
            mtime: remote.mtime,
        });
        self.snapshot.set(rel, SnapshotEntry::new(stat, remote.hash))
    }
}

/// Which side wins a content conflict
///
/// Strictly newer mtime wins; an exact tie goes to `origin`, the side that
/// reported the change.
///
/// The tie rule is asymmetric (the same conflict resolves differently
/// depending on which watcher fires first). It is kept for compatibility
/// with existing snapshots and is questionable.
#[must_use]
pub fn newer_side(local_mtime: f64, remote_mtime: f64, origin: Origin) -> Origin {
    if local_mtime > remote_mtime {
        Origin::Local
    } else if remote_mtime > local_mtime {
        Origin::Remote
    } else {
        origin
    }
}

/// Drain `events` one at a time until shutdown is requested and the queue
/// is idle, or every sender is gone. Returns the number of events handled.
pub fn run_worker(
    engine: &SyncEngine,
    events: &EventReceiver,
    shutdown: &AtomicBool,
    poll: Duration,
) -> u64 {
    let mut handled = 0;
    loop {
        match events.recv_timeout(poll) {
            Recv::Event(event) => {
                engine.process(&event);
                handled += 1;
            }
            Recv::Timeout => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
            Recv::Closed => break,
        }
    }
    debug!("Worker exiting after {handled} events");
    handled
}

/// Background thread running [`run_worker`]
pub struct Worker {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl Worker {
    #[must_use]
    pub fn spawn(engine: Arc<SyncEngine>, events: EventReceiver, poll: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || run_worker(&engine, &events, &flag, poll));
        Self { shutdown, handle }
    }

    /// Ask the worker to stop once the queue is idle and wait for it
    pub fn stop(self) -> u64 {
        self.shutdown.store(true, Ordering::Release);
        match self.handle.join() {
            Ok(handled) => handled,
            Err(_) => {
                error!("Sync worker panicked");
                0
            }
        }
    }
}
