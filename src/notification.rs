//! Host notification channel.
//!
//! Directory watchers, the signal handler and session hooks run on their own
//! threads. They never touch agent state; they push [`Notification`]s into
//! this channel and the scheduler loop consumes them.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Kind of filesystem change carried by a [`FileEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Create,
    Modify,
    Remove,
}

impl fmt::Display for FileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileEventKind::Create => "created",
            FileEventKind::Modify => "modified",
            FileEventKind::Remove => "removed",
        };
        f.write_str(s)
    }
}

/// A single file-I/O observation forwarded to the FileIo feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
}

impl FileEvent {
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Converts a raw `notify` event into zero or more file events.
    pub fn from_notify(event: &notify::Event) -> Vec<FileEvent> {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => FileEventKind::Create,
            EventKind::Modify(_) => FileEventKind::Modify,
            EventKind::Remove(_) => FileEventKind::Remove,
            _ => return Vec::new(),
        };

        event
            .paths
            .iter()
            .map(|path| FileEvent::new(kind, path.clone()))
            .collect()
    }
}

/// Signals delivered to the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A watched path changed.
    FileIo(FileEvent),
    /// The user session is ending (logoff).
    SessionEnding,
    /// The host wants the agent to exit.
    Shutdown,
}

/// Cloneable sending half, handed to collaborators at setup time.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSender {
    /// Pushes a notification. Returns `false` once the loop has gone away.
    pub fn send(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }

    pub fn file_io(&self, event: FileEvent) -> bool {
        self.send(Notification::FileIo(event))
    }

    pub fn session_ending(&self) -> bool {
        self.send(Notification::SessionEnding)
    }

    pub fn shutdown(&self) -> bool {
        self.send(Notification::Shutdown)
    }
}

/// Receiving half, owned by the scheduler loop.
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// Creates the notification channel.
pub fn channel() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    #[test]
    fn test_from_notify_maps_kinds() {
        let event = notify::Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/a.txt"))
            .add_path(PathBuf::from("/tmp/b.txt"));

        let events = FileEvent::from_notify(&event);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == FileEventKind::Create));

        let modify = notify::Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/a.txt"));
        assert_eq!(FileEvent::from_notify(&modify)[0].kind, FileEventKind::Modify);
    }

    #[test]
    fn test_from_notify_ignores_access() {
        let event = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/tmp/a.txt"));
        assert!(FileEvent::from_notify(&event).is_empty());
    }

    #[test]
    fn test_channel_delivers_in_order() {
        let (tx, mut rx) = channel();
        assert!(tx.session_ending());
        assert!(tx.shutdown());

        assert_eq!(rx.try_recv().unwrap(), Notification::SessionEnding);
        assert_eq!(rx.try_recv().unwrap(), Notification::Shutdown);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.shutdown());
    }
}
