//! Snapshot store: durable record of the last reconciled state per path
//!
//! The store is a JSON document mapping relative path to
//! `{size, mtime, hash}`. It is rewritten in full after every mutation, so the
//! file on disk is never more than one event behind memory.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::hash::ContentHash;
use crate::root::FileStat;

/// Last reconciled state of one path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub size: u64,
    /// Modification time, seconds since the UNIX epoch
    pub mtime: f64,
    pub hash: ContentHash,
}

impl SnapshotEntry {
    #[must_use]
    pub fn new(stat: FileStat, hash: ContentHash) -> Self {
        Self {
            size: stat.size,
            mtime: stat.mtime,
            hash,
        }
    }
}

/// In-memory mapping, keyed by `/`-separated relative path
pub type SnapshotMap = BTreeMap<String, SnapshotEntry>;

/// Snapshot persisted at a fixed path, guarded by a mutex
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    entries: Mutex<SnapshotMap>,
}

impl SnapshotStore {
    /// Load the snapshot at `path`.
    ///
    /// A missing file yields an empty snapshot. A corrupt or unreadable file is
    /// logged and also yields an empty snapshot, which makes the next initial
    /// scan a full reconciliation.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_map(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{e}; starting from an empty snapshot");
                SnapshotMap::new()
            }
        };
        debug!("Loaded {} snapshot entries from {}", entries.len(), path.display());
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Location of the snapshot document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn get(&self, rel: &str) -> Option<SnapshotEntry> {
        self.lock().get(rel).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of every entry
    #[must_use]
    pub fn entries(&self) -> SnapshotMap {
        self.lock().clone()
    }

    /// Keys strictly below the directory `dir`
    #[must_use]
    pub fn keys_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.lock()
            .range(prefix.clone()..)
            .map(|(rel, _)| rel)
            .take_while(|rel| rel.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Record `entry` for `rel` and persist
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the snapshot cannot be written.
    pub fn set(&self, rel: &str, entry: SnapshotEntry) -> Result<()> {
        self.update(|map| {
            map.insert(rel.to_string(), entry);
        })
    }

    /// Forget `rel` and persist. Returns the removed entry, if any.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the snapshot cannot be written.
    pub fn remove(&self, rel: &str) -> Result<Option<SnapshotEntry>> {
        let mut entries = self.lock();
        let removed = entries.remove(rel);
        if removed.is_some() {
            write_map(&self.path, &entries)?;
        }
        Ok(removed)
    }

    /// Move the entry for `src` to `dst` (replacing any entry at `dst`) and
    /// persist. Returns whether `src` was present.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the snapshot cannot be written.
    pub fn rename(&self, src: &str, dst: &str) -> Result<bool> {
        let mut entries = self.lock();
        let Some(entry) = entries.remove(src) else {
            return Ok(false);
        };
        entries.insert(dst.to_string(), entry);
        write_map(&self.path, &entries)?;
        Ok(true)
    }

    /// Apply several mutations under one lock, then persist once
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the snapshot cannot be written.
    pub fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SnapshotMap),
    {
        let mut entries = self.lock();
        mutate(&mut entries);
        write_map(&self.path, &entries)
    }

    /// Persist the current state
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the snapshot cannot be written.
    pub fn save(&self) -> Result<()> {
        let entries = self.lock();
        write_map(&self.path, &entries)
    }

    fn lock(&self) -> MutexGuard<'_, SnapshotMap> {
        // A panic while holding the lock leaves the map itself intact
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn read_map(path: &Path) -> Result<SnapshotMap> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SnapshotMap::new()),
        Err(e) => {
            return Err(SyncError::SnapshotCorrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| SyncError::SnapshotCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Full overwrite via a sibling temp file and rename
fn write_map(path: &Path, entries: &SnapshotMap) -> Result<()> {
    let json = serde_json::to_vec_pretty(entries)
        .map_err(|e| SyncError::io(path, std::io::Error::other(e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let mut file = std::fs::File::create(&temp_path).map_err(|e| SyncError::io(&temp_path, e))?;
    file.write_all(&json)
        .and_then(|()| file.sync_all())
        .map_err(|e| SyncError::io(&temp_path, e))?;
    drop(file);

    std::fs::rename(&temp_path, path).map_err(|e| SyncError::io(path, e))
}
