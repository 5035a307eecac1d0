//! Remote operations seam
//!
//! The engine only talks to the second tree through [`RemoteOps`]. The
//! bundled [`LocalDirRemote`] serves a plain directory; a network object
//! store would implement the same trait.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, SyncError};
use crate::filter::PathFilter;
use crate::hash::ContentHash;
use crate::root::{Root, copy_preserving_mtime, stat_file};
use crate::scan::walk_files;

/// Metadata of a remote file, computed on demand and never persisted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteMeta {
    pub size: u64,
    /// Seconds since the UNIX epoch
    pub mtime: f64,
    pub hash: ContentHash,
}

/// Primitive operations against the remote tree
///
/// Write operations return the absolute destination they touched so the
/// caller can register a suppression for it.
pub trait RemoteOps: Send + Sync {
    /// Directory the remote watcher observes
    fn root(&self) -> &Path;

    /// Absolute location of a relative path on the remote
    fn locate(&self, rel: &str) -> PathBuf;

    /// Relative key of an absolute remote path
    fn relativize(&self, abs: &Path) -> Option<String>;

    /// Upload `local_src` to `rel`
    ///
    /// # Errors
    /// Returns [`SyncError::RemoteUnavailable`] if the copy fails.
    fn put(&self, rel: &str, local_src: &Path) -> Result<PathBuf>;

    /// Download `rel` into `dest`
    ///
    /// # Errors
    /// Returns [`SyncError::RemoteUnavailable`] if the copy fails.
    fn get(&self, rel: &str, dest: &Path) -> Result<PathBuf>;

    /// Delete `rel`
    ///
    /// # Errors
    /// Returns [`SyncError::RemoteUnavailable`] if the file cannot be removed.
    fn delete(&self, rel: &str) -> Result<PathBuf>;

    /// Move `src` to `dst` on the remote
    ///
    /// # Errors
    /// Returns [`SyncError::RemoteUnavailable`] if the move fails.
    fn rename(&self, src: &str, dst: &str) -> Result<PathBuf>;

    /// Whether a file exists at `rel`
    fn exists(&self, rel: &str) -> bool;

    /// Size, mtime and hash of `rel`, or `None` if absent
    ///
    /// # Errors
    /// Returns [`SyncError::RemoteUnavailable`] if the file exists but cannot be read.
    fn meta(&self, rel: &str) -> Result<Option<RemoteMeta>>;

    /// Every file on the remote that passes `filter`, with hashes
    ///
    /// # Errors
    /// Returns [`SyncError::RemoteUnavailable`] if the tree cannot be listed.
    fn list(&self, filter: &PathFilter) -> Result<BTreeMap<String, RemoteMeta>>;
}

/// Remote backed by a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDirRemote {
    root: Root,
}

impl LocalDirRemote {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Root::new(root),
        }
    }
}

impl RemoteOps for LocalDirRemote {
    fn root(&self) -> &Path {
        self.root.path()
    }

    fn locate(&self, rel: &str) -> PathBuf {
        self.root.resolve(rel)
    }

    fn relativize(&self, abs: &Path) -> Option<String> {
        self.root.relative(abs)
    }

    fn put(&self, rel: &str, local_src: &Path) -> Result<PathBuf> {
        let dest = self.root.resolve(rel);
        copy_preserving_mtime(local_src, &dest).map_err(|e| SyncError::remote(rel, e))?;
        info!("[UPLOAD] {rel}");
        Ok(dest)
    }

    fn get(&self, rel: &str, dest: &Path) -> Result<PathBuf> {
        let src = self.root.resolve(rel);
        copy_preserving_mtime(&src, dest).map_err(|e| SyncError::remote(rel, e))?;
        info!("[DOWNLOAD] {rel} -> {}", dest.display());
        Ok(dest.to_path_buf())
    }

    fn delete(&self, rel: &str) -> Result<PathBuf> {
        let path = self.root.resolve(rel);
        std::fs::remove_file(&path).map_err(|e| SyncError::remote(rel, e))?;
        info!("[REMOTE DELETE] {rel}");
        Ok(path)
    }

    fn rename(&self, src: &str, dst: &str) -> Result<PathBuf> {
        let dest = self.root.rename(src, dst).map_err(|e| match e {
            SyncError::Io { source, .. } => SyncError::remote(src, source),
            other => other,
        })?;
        info!("[REMOTE MOVE] {src} -> {dst}");
        Ok(dest)
    }

    fn exists(&self, rel: &str) -> bool {
        self.root.is_file(rel)
    }

    fn meta(&self, rel: &str) -> Result<Option<RemoteMeta>> {
        let path = self.root.resolve(rel);
        let Some(stat) = stat_file(&path).map_err(|e| as_remote(rel, e))? else {
            return Ok(None);
        };
        let hash = ContentHash::from_file(&path).map_err(|e| as_remote(rel, e))?;
        Ok(Some(RemoteMeta {
            size: stat.size,
            mtime: stat.mtime,
            hash,
        }))
    }

    fn list(&self, filter: &PathFilter) -> Result<BTreeMap<String, RemoteMeta>> {
        let files = walk_files(&self.root, filter).map_err(|e| as_remote(".", e))?;
        let mut out = BTreeMap::new();
        for (rel, stat) in files {
            let path = self.root.resolve(&rel);
            let hash = match ContentHash::from_file(&path) {
                Ok(hash) => hash,
                // Deleted between listing and hashing
                Err(e) if e.is_vanished() => continue,
                Err(e) => return Err(as_remote(&rel, e)),
            };
            out.insert(
                rel,
                RemoteMeta {
                    size: stat.size,
                    mtime: stat.mtime,
                    hash,
                },
            );
        }
        Ok(out)
    }
}

fn as_remote(rel: &str, err: SyncError) -> SyncError {
    match err {
        SyncError::Io { source, .. } => SyncError::remote(rel, source),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_roundtrip_preserves_mtime() {
        let local = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let remote = LocalDirRemote::new(remote_dir.path());

        let src = local.path().join("doc.txt");
        std::fs::write(&src, "hello").unwrap();
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        let dest = remote.put("a/doc.txt", &src).unwrap();
        assert_eq!(dest, remote_dir.path().join("a/doc.txt"));

        let meta = remote.meta("a/doc.txt").unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.hash, ContentHash::from_bytes(b"hello"));
        assert!((meta.mtime - 1_700_000_000.0).abs() < 1e-6);

        let back = local.path().join("copy/doc.txt");
        remote.get("a/doc.txt", &back).unwrap();
        assert_eq!(std::fs::read_to_string(back).unwrap(), "hello");
    }

    #[test]
    fn test_meta_absent_and_exists() {
        let remote_dir = TempDir::new().unwrap();
        std::fs::create_dir(remote_dir.path().join("dir")).unwrap();
        let remote = LocalDirRemote::new(remote_dir.path());

        assert!(remote.meta("missing.txt").unwrap().is_none());
        assert!(remote.meta("dir").unwrap().is_none());
        assert!(!remote.exists("missing.txt"));
        assert!(!remote.exists("dir"));
    }

    #[test]
    fn test_delete_and_rename() {
        let remote_dir = TempDir::new().unwrap();
        std::fs::write(remote_dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(remote_dir.path().join("b.txt"), "b").unwrap();
        let remote = LocalDirRemote::new(remote_dir.path());

        let moved = remote.rename("a.txt", "sub/c.txt").unwrap();
        assert_eq!(moved, remote_dir.path().join("sub/c.txt"));
        assert!(!remote.exists("a.txt"));
        assert!(remote.exists("sub/c.txt"));

        let deleted = remote.delete("b.txt").unwrap();
        assert_eq!(deleted, remote_dir.path().join("b.txt"));
        assert!(!remote.exists("b.txt"));
    }

    #[test]
    fn test_failures_are_remote_errors() {
        let remote_dir = TempDir::new().unwrap();
        let remote = LocalDirRemote::new(remote_dir.path());

        let err = remote.delete("nope.txt").unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));

        let err = remote
            .put("x.txt", &remote_dir.path().join("no-such-source"))
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable { .. }));
        assert!(err.is_vanished());
    }

    #[test]
    fn test_list_hashes_and_filters() {
        let remote_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(remote_dir.path().join("sub")).unwrap();
        std::fs::write(remote_dir.path().join("keep.txt"), "k").unwrap();
        std::fs::write(remote_dir.path().join("sub/nested.txt"), "n").unwrap();
        std::fs::write(remote_dir.path().join("skip.swp"), "s").unwrap();

        let remote = LocalDirRemote::new(remote_dir.path());
        let filter = PathFilter::new(["*.swp"]).unwrap();
        let listing = remote.list(&filter).unwrap();

        let keys: Vec<_> = listing.keys().cloned().collect();
        assert_eq!(keys, vec!["keep.txt".to_string(), "sub/nested.txt".to_string()]);
        assert_eq!(listing["keep.txt"].hash, ContentHash::from_bytes(b"k"));
    }
}
