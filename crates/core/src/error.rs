//! Error types for bisync-core

use std::path::PathBuf;

/// Result type for bisync-core operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing two roots
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A local file vanished, was locked, or could not be read/written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed event for {path}: {reason}")]
    MalformedEvent { path: PathBuf, reason: String },

    #[error("snapshot at {path} is corrupt: {message}")]
    SnapshotCorrupt { path: PathBuf, message: String },

    /// The remote side refused or failed an operation.
    #[error("remote unavailable for {path}: {source}")]
    RemoteUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn remote(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::RemoteUnavailable {
            path: path.into(),
            source,
        }
    }

    /// True when the path simply disappeared between notification and
    /// processing. Such events are stale and expected under churn.
    #[must_use]
    pub fn is_vanished(&self) -> bool {
        match self {
            Self::Io { source, .. } | Self::RemoteUnavailable { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
