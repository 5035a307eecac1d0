//! Suppression registry for self-inflicted writes
//!
//! When the engine writes, deletes or moves a path on one root, that root's
//! watcher will report the change back. Marking the path here lets the engine
//! drop that echo instead of reconciling it again.
//!
//! The window is a trade-off, not a guarantee: it must outlast watcher
//! delivery latency (debounce included), but a genuine edit to the same path
//! inside the window is swallowed too. Such an edit is picked up by the next
//! event for the path or by the next startup scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::trace;

/// Default suppression window
pub const DEFAULT_SUPPRESS_WINDOW: Duration = Duration::from_millis(1500);

/// Expiring set of absolute paths recently written by the engine
#[derive(Debug)]
pub struct SuppressionRegistry {
    window: Duration,
    entries: Mutex<HashMap<PathBuf, Instant>>,
}

impl Default for SuppressionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESS_WINDOW)
    }
}

impl SuppressionRegistry {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record that the engine just wrote `path`
    pub fn mark_self_write(&self, path: &Path) {
        let now = Instant::now();
        let mut entries = self.lock();
        Self::sweep_locked(&mut entries, now);
        entries.insert(path.to_path_buf(), now + self.window);
        trace!("Suppressing {} for {:?}", path.display(), self.window);
    }

    /// Whether events for `path` should currently be ignored
    #[must_use]
    pub fn is_suppressed(&self, path: &Path) -> bool {
        let mut entries = self.lock();
        Self::sweep_locked(&mut entries, Instant::now());
        entries.contains_key(path)
    }

    /// Drop expired entries
    pub fn sweep(&self) {
        let mut entries = self.lock();
        Self::sweep_locked(&mut entries, Instant::now());
    }

    /// Number of live (unexpired) entries
    #[must_use]
    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        Self::sweep_locked(&mut entries, Instant::now());
        entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_locked(entries: &mut HashMap<PathBuf, Instant>, now: Instant) {
        entries.retain(|_, expires_at| *expires_at > now);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
