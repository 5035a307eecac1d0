//! Root watchers: native filesystem notifications to [`SyncEvent`]s
//!
//! Each watcher is bound to one root and stamps its origin on every event.
//! Watchers are pure producers: they never look at the snapshot or the
//! suppression registry, and bursts (save-to-temp-then-rename and friends)
//! are absorbed by the engine, not here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind as NotifyKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tracing::{debug, info, trace, warn};

use crate::error::{Result, SyncError};
use crate::event::{EventSender, Origin, SyncEvent};
use crate::filter::PathFilter;
use crate::root::Root;
use crate::scan::walk_files;

/// Maps raw notify events on one root to sync events
#[derive(Debug, Clone)]
pub struct EventTranslator {
    origin: Origin,
    root: Root,
    filter: PathFilter,
}

impl EventTranslator {
    #[must_use]
    pub fn new(origin: Origin, root: Root, filter: PathFilter) -> Self {
        Self {
            origin,
            root,
            filter,
        }
    }

    /// Translate one notify event into zero or more sync events
    ///
    /// Directory-level notifications are dropped, except that a directory
    /// moved or renamed into place expands to one event per file inside it.
    #[must_use]
    pub fn translate(&self, event: &notify::Event) -> Vec<SyncEvent> {
        let mut out = Vec::new();

        match &event.kind {
            NotifyKind::Create(CreateKind::Folder)
            | NotifyKind::Remove(RemoveKind::Folder)
            | NotifyKind::Access(_)
            | NotifyKind::Other => {}

            NotifyKind::Create(_) => {
                for path in &event.paths {
                    self.push_file(&mut out, path, |o, p| SyncEvent::created(o, p));
                }
            }

            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [src, dst] = event.paths.as_slice() {
                    self.push_move(&mut out, src, dst);
                } else {
                    warn!("Rename event with {} paths, ignoring", event.paths.len());
                }
            }

            // Unpaired halves of a rename: the other side is outside the root
            NotifyKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.exists() {
                        self.push_arrival(&mut out, path);
                    } else {
                        self.push_removal(&mut out, path);
                    }
                }
            }

            NotifyKind::Modify(_) | NotifyKind::Any => {
                for path in &event.paths {
                    self.push_file(&mut out, path, |o, p| SyncEvent::modified(o, p));
                }
            }

            NotifyKind::Remove(_) => {
                for path in &event.paths {
                    self.push_removal(&mut out, path);
                }
            }
        }

        out
    }

    fn tracked(&self, path: &Path, is_dir: bool) -> bool {
        self.root
            .relative(path)
            .is_some_and(|rel| !self.filter.is_ignored(&rel, is_dir))
    }

    fn push_file(
        &self,
        out: &mut Vec<SyncEvent>,
        path: &Path,
        make: fn(Origin, PathBuf) -> SyncEvent,
    ) {
        if path.is_dir() || !self.tracked(path, false) {
            return;
        }
        out.push(make(self.origin, path.to_path_buf()));
    }

    fn push_removal(&self, out: &mut Vec<SyncEvent>, path: &Path) {
        if self.tracked(path, false) {
            out.push(SyncEvent::deleted(self.origin, path.to_path_buf()));
        }
    }

    /// A file or directory appeared in one step (e.g. moved in from elsewhere)
    fn push_arrival(&self, out: &mut Vec<SyncEvent>, path: &Path) {
        if path.is_dir() {
            for file in self.files_under(path) {
                out.push(SyncEvent::created(self.origin, file));
            }
        } else {
            self.push_file(out, path, |o, p| SyncEvent::created(o, p));
        }
    }

    fn push_move(&self, out: &mut Vec<SyncEvent>, src: &Path, dst: &Path) {
        if dst.is_dir() {
            // One move per file, mapped back under the old directory name
            for file in self.files_under(dst) {
                if let Ok(suffix) = file.strip_prefix(dst) {
                    self.push_move(out, &src.join(suffix), &file);
                }
            }
            return;
        }

        match (self.tracked(src, false), self.tracked(dst, false)) {
            (true, true) => out.push(SyncEvent::moved(self.origin, src, dst)),
            // Renamed from an ignored name (editor temp file) into a tracked one
            (false, true) => out.push(SyncEvent::created(self.origin, dst)),
            (true, false) => out.push(SyncEvent::deleted(self.origin, src)),
            (false, false) => {}
        }
    }

    fn files_under(&self, dir: &Path) -> Vec<PathBuf> {
        match walk_files(&Root::new(dir), &PathFilter::default()) {
            Ok(files) => files
                .into_iter()
                .map(|(rel, _)| Root::new(dir).resolve(&rel))
                .filter(|path| self.tracked(path, false))
                .collect(),
            Err(e) => {
                debug!("Could not expand directory {}: {e}", dir.display());
                Vec::new()
            }
        }
    }
}

/// A debounced recursive watcher on one root
pub struct RootWatcher {
    origin: Origin,
    root: PathBuf,
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl RootWatcher {
    /// Start watching `root`, pushing translated events into `sender`
    ///
    /// # Errors
    /// Returns [`SyncError::Watch`] if the OS watcher cannot be created or armed.
    pub fn spawn(
        origin: Origin,
        root: &Path,
        filter: PathFilter,
        debounce: Duration,
        sender: EventSender,
    ) -> Result<Self> {
        let translator = EventTranslator::new(origin, Root::new(root), filter);

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        for sync_event in translator.translate(&event.event) {
                            trace!("{origin} {:?} {}", sync_event.kind, sync_event.src.display());
                            if !sender.push(sync_event) {
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!("Watch error on {origin} root: {e}");
                    }
                }
            }
        })
        .map_err(|e| SyncError::Watch {
            path: root.to_path_buf(),
            source: e,
        })?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Watch {
                path: root.to_path_buf(),
                source: e,
            })?;

        info!("Watching {origin} root {}", root.display());

        Ok(Self {
            origin,
            root: root.to_path_buf(),
            debouncer,
        })
    }

    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Stop watching. Waits for the debouncer thread, which drops this
    /// watcher's queue sender.
    pub fn stop(self) {
        info!("Stopping {} watcher on {}", self.origin, self.root.display());
        self.debouncer.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use notify::event::{AccessKind, DataChange};
    use tempfile::TempDir;

    fn translator(dir: &TempDir, filter: PathFilter) -> EventTranslator {
        EventTranslator::new(Origin::Local, Root::new(dir.path()), filter)
    }

    fn raw(kind: NotifyKind, paths: &[PathBuf]) -> notify::Event {
        paths
            .iter()
            .fold(notify::Event::new(kind), |event, path| event.add_path(path.clone()))
    }

    #[test]
    fn test_create_and_modify_on_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        let t = translator(&dir, PathFilter::default());

        let created = t.translate(&raw(NotifyKind::Create(CreateKind::File), &[file.clone()]));
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, EventKind::Created);
        assert_eq!(created[0].origin, Origin::Local);
        assert_eq!(created[0].src, file);

        let modified = t.translate(&raw(
            NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[file.clone()],
        ));
        assert_eq!(modified[0].kind, EventKind::Modified);
    }

    #[test]
    fn test_directory_events_dropped() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let t = translator(&dir, PathFilter::default());

        assert!(t.translate(&raw(NotifyKind::Create(CreateKind::Folder), &[sub.clone()])).is_empty());
        assert!(t.translate(&raw(NotifyKind::Create(CreateKind::Any), &[sub.clone()])).is_empty());
        assert!(t.translate(&raw(NotifyKind::Remove(RemoveKind::Folder), &[sub.clone()])).is_empty());
        assert!(t.translate(&raw(NotifyKind::Access(AccessKind::Any), &[sub])).is_empty());
    }

    #[test]
    fn test_remove_of_vanished_file() {
        let dir = TempDir::new().unwrap();
        let t = translator(&dir, PathFilter::default());
        let gone = dir.path().join("foo/bar.txt");

        let events = t.translate(&raw(NotifyKind::Remove(RemoveKind::File), &[gone.clone()]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Deleted);
        assert_eq!(events[0].src, gone);
    }

    #[test]
    fn test_rename_both_becomes_move() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        std::fs::write(&dst, "x").unwrap();
        let t = translator(&dir, PathFilter::default());

        let events = t.translate(&raw(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[src.clone(), dst.clone()],
        ));
        assert_eq!(events, vec![SyncEvent {
            timestamp: events[0].timestamp,
            ..SyncEvent::moved(Origin::Local, src, dst)
        }]);
    }

    #[test]
    fn test_rename_from_ignored_temp_becomes_create() {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join(".doc.txt.swp");
        let dst = dir.path().join("doc.txt");
        std::fs::write(&dst, "saved").unwrap();
        let t = translator(&dir, PathFilter::new(["*.swp"]).unwrap());

        let events = t.translate(&raw(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[tmp, dst.clone()],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Created);
        assert_eq!(events[0].src, dst);
    }

    #[test]
    fn test_directory_rename_expands_per_file() {
        let dir = TempDir::new().unwrap();
        let new_dir = dir.path().join("new");
        std::fs::create_dir_all(new_dir.join("inner")).unwrap();
        std::fs::write(new_dir.join("one.txt"), "1").unwrap();
        std::fs::write(new_dir.join("inner/two.txt"), "2").unwrap();
        let t = translator(&dir, PathFilter::default());

        let mut events = t.translate(&raw(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &[dir.path().join("old"), new_dir.clone()],
        ));
        events.sort_by(|a, b| a.src.cmp(&b.src));

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Moved));
        assert_eq!(events[0].src, dir.path().join("old/inner/two.txt"));
        assert_eq!(events[0].dst, Some(new_dir.join("inner/two.txt")));
        assert_eq!(events[1].src, dir.path().join("old/one.txt"));
    }

    #[test]
    fn test_unpaired_rename_halves() {
        let dir = TempDir::new().unwrap();
        let arrived = dir.path().join("in.txt");
        std::fs::write(&arrived, "x").unwrap();
        let left = dir.path().join("out.txt");
        let t = translator(&dir, PathFilter::default());

        let events = t.translate(&raw(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::To)),
            &[arrived],
        ));
        assert_eq!(events[0].kind, EventKind::Created);

        let events = t.translate(&raw(
            NotifyKind::Modify(ModifyKind::Name(RenameMode::From)),
            &[left],
        ));
        assert_eq!(events[0].kind, EventKind::Deleted);
    }

    #[test]
    fn test_paths_outside_root_dropped() {
        let dir = TempDir::new().unwrap();
        let t = translator(&dir, PathFilter::default());
        let events = t.translate(&raw(
            NotifyKind::Remove(RemoveKind::File),
            &[PathBuf::from("/elsewhere/file.txt")],
        ));
        assert!(events.is_empty());
    }
}
