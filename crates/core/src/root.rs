//! One synced tree: relative-path mapping and plain-file operations

use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Size and modification time of a plain file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    pub size: u64,
    /// Seconds since the UNIX epoch
    pub mtime: f64,
}

impl FileStat {
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            size: metadata.len(),
            mtime: mtime_secs(metadata),
        }
    }
}

/// Modification time of `metadata` as float seconds since the epoch
#[must_use]
pub fn mtime_secs(metadata: &Metadata) -> f64 {
    let ft = FileTime::from_last_modification_time(metadata);
    ft.unix_seconds() as f64 + f64::from(ft.nanoseconds()) / 1e9
}

/// A root directory that relative paths are resolved against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    path: PathBuf,
}

impl Root {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute location of a `/`-separated relative path
    #[must_use]
    pub fn resolve(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.path.clone(), |acc, part| acc.join(part))
    }

    /// Relative key of an absolute path, or `None` if it is not strictly
    /// inside this root or is not valid UTF-8.
    #[must_use]
    pub fn relative(&self, abs: &Path) -> Option<String> {
        let stripped = abs.strip_prefix(&self.path).ok()?;
        let mut parts = Vec::new();
        for component in stripped.components() {
            match component {
                Component::Normal(part) => {
                    let Some(part) = part.to_str() else {
                        debug!("Skipping non-UTF-8 path {}", abs.display());
                        return None;
                    };
                    parts.push(part.to_string());
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Stat a relative path. Missing paths and directories yield `None`.
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] for failures other than the path not existing.
    pub fn stat(&self, rel: &str) -> Result<Option<FileStat>> {
        stat_file(&self.resolve(rel))
    }

    /// Whether a plain file exists at `rel`
    #[must_use]
    pub fn is_file(&self, rel: &str) -> bool {
        self.resolve(rel).is_file()
    }

    /// Remove the file at `rel`, returning its absolute path
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the file cannot be removed.
    pub fn remove_file(&self, rel: &str) -> Result<PathBuf> {
        let path = self.resolve(rel);
        std::fs::remove_file(&path).map_err(|e| SyncError::io(&path, e))?;
        Ok(path)
    }

    /// Move `src` to `dst` inside this root, returning the destination
    ///
    /// # Errors
    /// Returns [`SyncError::Io`] if the parent cannot be created or the rename fails.
    pub fn rename(&self, src: &str, dst: &str) -> Result<PathBuf> {
        let from = self.resolve(src);
        let to = self.resolve(dst);
        ensure_parent(&to)?;
        std::fs::rename(&from, &to).map_err(|e| SyncError::io(&from, e))?;
        Ok(to)
    }
}

/// Stat an absolute path, treating "not found" and directories as absent
///
/// # Errors
/// Returns [`SyncError::Io`] for failures other than the path not existing.
pub fn stat_file(path: &Path) -> Result<Option<FileStat>> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(Some(FileStat::from_metadata(&metadata))),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

/// Create the parent directory of `path` if needed
///
/// # Errors
/// Returns [`SyncError::Io`] if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
    }
    Ok(())
}

/// Whole-file copy that carries the source modification time over to the
/// destination. Parent directories of `dst` are created on demand.
///
/// Not atomic: a crash mid-copy leaves a partial file that the next hash
/// comparison reconciles.
///
/// # Errors
/// Returns the underlying I/O error; callers attach the path context.
pub fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let metadata = std::fs::metadata(src)?;
    std::fs::copy(src, dst)?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_and_relative_roundtrip() {
        let root = Root::new("/data/local");
        let abs = root.resolve("foo/bar.txt");
        assert_eq!(abs, PathBuf::from("/data/local/foo/bar.txt"));
        assert_eq!(root.relative(&abs).as_deref(), Some("foo/bar.txt"));
    }

    #[test]
    fn test_relative_rejects_outside_and_root_itself() {
        let root = Root::new("/data/local");
        assert_eq!(root.relative(Path::new("/data/remote/a.txt")), None);
        assert_eq!(root.relative(Path::new("/data/local")), None);
        assert_eq!(root.relative(Path::new("/data/local/../x")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt as _;

        let root = Root::new("/data/root");
        let bad = Path::new("/data/root/dir").join(OsStr::from_bytes(b"bad\xff.txt"));
        assert_eq!(root.relative(&bad), None);
        assert_eq!(
            root.relative(Path::new("/data/root/dir/good.txt")),
            Some("dir/good.txt".to_string())
        );
    }

    #[test]
    fn test_stat_ignores_directories_and_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "12345").unwrap();

        let root = Root::new(dir.path());
        assert!(root.stat("sub").unwrap().is_none());
        assert!(root.stat("missing.txt").unwrap().is_none());
        assert_eq!(root.stat("file.txt").unwrap().unwrap().size, 5);
    }

    #[test]
    fn test_copy_preserves_mtime_and_creates_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, "content").unwrap();
        filetime::set_file_mtime(&src, FileTime::from_unix_time(1_704_067_200, 0)).unwrap();

        let dst = dir.path().join("a/b/dst.txt");
        copy_preserving_mtime(&src, &dst).unwrap();

        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "content");
        let stat = stat_file(&dst).unwrap().unwrap();
        assert!((stat.mtime - 1_704_067_200.0).abs() < 1e-6);
    }

    #[test]
    fn test_rename_creates_destination_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();

        let root = Root::new(dir.path());
        let dst = root.rename("a.txt", "nested/b.txt").unwrap();

        assert_eq!(dst, dir.path().join("nested/b.txt"));
        assert!(!dir.path().join("a.txt").exists());
        assert!(dst.exists());
    }
}
