//! Sync events and the queue between watchers and the worker

use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, SystemTime};

/// Which root produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    /// The other root
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A file change observed on one root
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub kind: EventKind,
    pub origin: Origin,
    /// Absolute path the event is about (the old path for moves)
    pub src: PathBuf,
    /// New absolute path, present on moves only
    pub dst: Option<PathBuf>,
    pub timestamp: SystemTime,
}

impl SyncEvent {
    #[must_use]
    pub fn new(kind: EventKind, origin: Origin, src: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            origin,
            src: src.into(),
            dst: None,
            timestamp: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn created(origin: Origin, path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Created, origin, path)
    }

    #[must_use]
    pub fn modified(origin: Origin, path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Modified, origin, path)
    }

    #[must_use]
    pub fn deleted(origin: Origin, path: impl Into<PathBuf>) -> Self {
        Self::new(EventKind::Deleted, origin, path)
    }

    #[must_use]
    pub fn moved(origin: Origin, src: impl Into<PathBuf>, dst: impl Into<PathBuf>) -> Self {
        Self {
            dst: Some(dst.into()),
            ..Self::new(EventKind::Moved, origin, src)
        }
    }
}

/// Create the event queue: any number of senders, one receiver
#[must_use]
pub fn queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half, cloned into each watcher
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<SyncEvent>,
}

impl EventSender {
    /// Push an event. Returns `false` once the receiver is gone.
    pub fn push(&self, event: SyncEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Result of waiting on the queue
#[derive(Debug)]
pub enum Recv {
    Event(SyncEvent),
    Timeout,
    /// Every sender has been dropped and the queue is drained
    Closed,
}

/// Consumer half, owned by the worker
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<SyncEvent>,
}

impl EventReceiver {
    /// Block until an event arrives, the timeout passes, or all senders are gone
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Recv {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Recv::Event(event),
            Err(mpsc::RecvTimeoutError::Timeout) => Recv::Timeout,
            Err(mpsc::RecvTimeoutError::Disconnected) => Recv::Closed,
        }
    }

    /// Next queued event without blocking
    #[must_use]
    pub fn try_recv(&self) -> Option<SyncEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let (tx, rx) = queue();
        tx.push(SyncEvent::created(Origin::Local, "/l/a"));
        tx.push(SyncEvent::deleted(Origin::Remote, "/r/b"));

        let Recv::Event(first) = rx.recv_timeout(Duration::from_millis(10)) else {
            panic!("expected event");
        };
        assert_eq!(first.kind, EventKind::Created);
        assert_eq!(rx.try_recv().unwrap().kind, EventKind::Deleted);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Recv::Timeout
        ));
    }

    #[test]
    fn test_closed_after_senders_drop() {
        let (tx, rx) = queue();
        let tx2 = tx.clone();
        tx2.push(SyncEvent::modified(Origin::Local, "/l/a"));
        drop(tx);
        drop(tx2);

        // Queued events are still delivered before the close
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Recv::Event(_)
        ));
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(10)),
            Recv::Closed
        ));
    }

    #[test]
    fn test_push_fails_without_receiver() {
        let (tx, rx) = queue();
        drop(rx);
        assert!(!tx.push(SyncEvent::created(Origin::Local, "/l/a")));
    }

    #[test]
    fn test_moved_carries_destination() {
        let event = SyncEvent::moved(Origin::Remote, "/r/a.txt", "/r/b.txt");
        assert_eq!(event.kind, EventKind::Moved);
        assert_eq!(event.dst, Some(PathBuf::from("/r/b.txt")));
        assert_eq!(event.origin.opposite(), Origin::Local);
    }
}
