//! Tree listing and the one-shot initial scan
//!
//! The initial scan runs once at startup, before the watchers are armed. It
//! diffs both trees against the snapshot and performs a catch-up sync.
//! Afterwards only watcher events drive reconciliation.

use std::collections::BTreeMap;
use std::io;

use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::engine::{Outcome, SyncEngine};
use crate::error::{Result, SyncError};
use crate::event::Origin;
use crate::filter::PathFilter;
use crate::hash::ContentHash;
use crate::root::{FileStat, Root, stat_file};
use crate::snapshot::SnapshotEntry;

/// List every plain file under `root` that passes `filter`, keyed by
/// relative path. Metadata only, no hashing.
///
/// Gitignore handling of the walker is disabled: only `filter` decides.
///
/// # Errors
/// Returns [`SyncError::Io`] if the root cannot be traversed.
pub fn walk_files(root: &Root, filter: &PathFilter) -> Result<BTreeMap<String, FileStat>> {
    if !root.path().is_dir() {
        return Err(SyncError::io(
            root.path(),
            io::Error::new(io::ErrorKind::NotFound, "root is not a directory"),
        ));
    }

    let mut builder = WalkBuilder::new(root.path());
    builder
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .follow_links(false);

    let entry_root = root.clone();
    let entry_filter = filter.clone();
    builder.filter_entry(move |entry| {
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        entry_root
            .relative(entry.path())
            .is_none_or(|rel| !entry_filter.is_ignored(&rel, is_dir))
    });

    let mut files = BTreeMap::new();
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                let source = match e.io_error() {
                    // Vanished mid-walk
                    Some(io_err) if io_err.kind() == io::ErrorKind::NotFound => continue,
                    Some(io_err) => io::Error::new(io_err.kind(), e.to_string()),
                    None => io::Error::other(e.to_string()),
                };
                return Err(SyncError::io(root.path(), source));
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(rel) = root.relative(entry.path()) else {
            continue;
        };
        if let Some(stat) = stat_file(entry.path())? {
            files.insert(rel, stat);
        }
    }

    Ok(files)
}

/// What the initial scan did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Local-only or locally newer paths pushed to the remote
    pub uploaded: Vec<String>,
    /// Remote-only paths pulled into the local tree
    pub downloaded: Vec<String>,
    /// Paths already known to the snapshot that changed while offline
    pub reconciled: Vec<String>,
    /// New snapshot entries recorded
    pub recorded: usize,
    /// Paths that failed and were left for a later event or scan
    pub skipped: Vec<String>,
}

impl ScanReport {
    /// True if nothing was transferred
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.uploaded.is_empty() && self.downloaded.is_empty() && self.reconciled.is_empty()
    }
}

/// One-shot startup reconciliation against the loaded snapshot
pub struct InitialScanner<'a> {
    engine: &'a SyncEngine,
}

impl<'a> InitialScanner<'a> {
    #[must_use]
    pub fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }

    /// Run the scan.
    ///
    /// - Local paths missing from the snapshot are hashed and recorded, and
    ///   uploaded unless the remote already holds the same hash.
    /// - Remote-only paths are downloaded and recorded.
    /// - Paths known to the snapshot whose local metadata or remote hash drifted
    ///   while the engine was not running are reconciled like watcher events.
    ///
    /// # Errors
    /// Returns an error if either tree cannot be listed or the snapshot cannot
    /// be written. Per-file failures are logged and reported as skipped.
    pub fn run(&self) -> Result<ScanReport> {
        let engine = self.engine;
        let local = engine.local();
        let remote = engine.remote();

        info!("Running initial reconciliation...");
        let known = engine.snapshot().entries();
        let local_files = walk_files(local, engine.filter())?;
        let remote_files = remote.list(engine.filter())?;
        debug!(
            "Initial scan: {} local, {} remote, {} known",
            local_files.len(),
            remote_files.len(),
            known.len()
        );

        let mut report = ScanReport::default();
        let mut updates: Vec<(String, SnapshotEntry)> = Vec::new();

        for (rel, stat) in &local_files {
            if known.contains_key(rel) {
                continue;
            }
            let path = local.resolve(rel);
            let hash = match ContentHash::from_file(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    debug!("Skipping {rel}: {e}");
                    report.skipped.push(rel.clone());
                    continue;
                }
            };
            updates.push((rel.clone(), SnapshotEntry::new(*stat, hash)));

            if remote_files.get(rel).is_some_and(|meta| meta.hash == hash) {
                continue;
            }
            match remote.put(rel, &path) {
                Ok(dest) => {
                    engine.suppression().mark_self_write(&dest);
                    report.uploaded.push(rel.clone());
                }
                Err(e) => {
                    warn!("Initial upload of {rel} failed: {e}");
                    report.skipped.push(rel.clone());
                }
            }
        }

        for (rel, meta) in &remote_files {
            if local_files.contains_key(rel) {
                continue;
            }
            let dest = local.resolve(rel);
            match remote.get(rel, &dest) {
                Ok(dest) => {
                    engine.suppression().mark_self_write(&dest);
                    let stat = stat_file(&dest)?.unwrap_or(FileStat {
                        size: meta.size,
                        mtime: meta.mtime,
                    });
                    updates.push((rel.clone(), SnapshotEntry::new(stat, meta.hash)));
                    info!("[INIT DOWNLOAD] {rel}");
                    report.downloaded.push(rel.clone());
                }
                Err(e) => {
                    warn!("Initial download of {rel} failed: {e}");
                    report.skipped.push(rel.clone());
                }
            }
        }

        report.recorded = updates.len();
        engine.snapshot().update(|map| map.extend(updates))?;

        for (rel, recorded) in &known {
            let (Some(stat), Some(meta)) = (local_files.get(rel), remote_files.get(rel)) else {
                continue;
            };
            let recorded_stat = FileStat {
                size: recorded.size,
                mtime: recorded.mtime,
            };
            let local_drifted = *stat != recorded_stat;
            let origin = if local_drifted {
                Origin::Local
            } else if meta.hash != recorded.hash {
                Origin::Remote
            } else {
                continue;
            };

            match engine.reconcile(origin, rel) {
                Ok(Outcome::Uploaded | Outcome::Downloaded) => report.reconciled.push(rel.clone()),
                Ok(_) => {}
                Err(e) => {
                    warn!("Reconciling {rel} failed: {e}");
                    report.skipped.push(rel.clone());
                }
            }
        }

        info!(
            "Initial reconciliation done: {} uploaded, {} downloaded, {} reconciled",
            report.uploaded.len(),
            report.downloaded.len(),
            report.reconciled.len()
        );
        Ok(report)
    }
}
