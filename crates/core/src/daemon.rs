//! Startup and shutdown of a running sync
//!
//! Order matters: the initial scan finishes before the worker starts, and the
//! worker starts before the watchers so nothing they report is lost. Shutdown
//! runs in reverse.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::engine::{SyncEngine, Worker};
use crate::error::{Result, SyncError};
use crate::event::{Origin, queue};
use crate::filter::PathFilter;
use crate::remote::LocalDirRemote;
use crate::scan::{InitialScanner, ScanReport};
use crate::snapshot::SnapshotStore;
use crate::suppress::SuppressionRegistry;
use crate::watch::RootWatcher;

/// Build an engine from `config`: create both roots, resolve them to
/// absolute paths, load the snapshot and compile the ignore patterns.
///
/// # Errors
/// Returns [`SyncError::Config`] if the roots overlap or a pattern is invalid,
/// and [`SyncError::Io`] if a root cannot be created.
pub fn open_engine(config: &SyncConfig) -> Result<Arc<SyncEngine>> {
    let local = create_root(&config.local_root)?;
    let remote = create_root(&config.remote_root)?;
    if local.starts_with(&remote) || remote.starts_with(&local) {
        return Err(SyncError::Config {
            path: local,
            message: format!("roots must not overlap (remote is {})", remote.display()),
        });
    }

    let snapshot = SnapshotStore::load(absolute_file(&config.snapshot)?);
    let filter = PathFilter::new(&config.ignore)?;

    Ok(Arc::new(SyncEngine::new(
        local,
        Arc::new(LocalDirRemote::new(remote)),
        snapshot,
        SuppressionRegistry::new(config.suppress_window()),
        filter,
    )))
}

fn create_root(path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(path).map_err(|e| SyncError::io(path, e))?;
    path.canonicalize().map_err(|e| SyncError::io(path, e))
}

/// Canonical parent joined with the file name; the file itself may not exist yet
fn absolute_file(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = create_root(parent)?;
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

/// A running sync: two watchers feeding one worker
pub struct SyncDaemon {
    engine: Arc<SyncEngine>,
    watchers: Vec<RootWatcher>,
    worker: Worker,
}

impl SyncDaemon {
    /// Run the initial scan, then start the worker and both watchers
    ///
    /// # Errors
    /// Returns startup errors from [`open_engine`], the initial scan, or
    /// arming a watcher. Nothing keeps running on error.
    pub fn start(config: &SyncConfig) -> Result<(Self, ScanReport)> {
        let engine = open_engine(config)?;
        let report = InitialScanner::new(&engine).run()?;

        let (sender, receiver) = queue();
        let worker = Worker::spawn(Arc::clone(&engine), receiver, config.poll_interval());

        let mut watchers = Vec::with_capacity(2);
        let roots = [
            (Origin::Local, engine.local().path().to_path_buf()),
            (Origin::Remote, engine.remote().root().to_path_buf()),
        ];
        for (origin, root) in roots {
            match RootWatcher::spawn(
                origin,
                &root,
                engine.filter().clone(),
                config.debounce(),
                sender.clone(),
            ) {
                Ok(watcher) => watchers.push(watcher),
                Err(e) => {
                    for watcher in watchers {
                        watcher.stop();
                    }
                    drop(sender);
                    worker.stop();
                    return Err(e);
                }
            }
        }
        // Only the watchers hold senders now; the queue closes once both stop
        drop(sender);

        info!(
            "Syncing {} <-> {}",
            engine.local().path().display(),
            engine.remote().root().display()
        );
        Ok((
            Self {
                engine,
                watchers,
                worker,
            },
            report,
        ))
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Stop both watchers, drain the queue and join the worker.
    /// Returns the number of events the worker handled.
    pub fn shutdown(self) -> u64 {
        info!("Shutting down...");
        for watcher in self.watchers {
            watcher.stop();
        }
        let handled = self.worker.stop();
        if let Err(e) = self.engine.snapshot().save() {
            warn!("Final snapshot save failed: {e}");
        }
        info!("Stopped after {handled} events");
        handled
    }
}
