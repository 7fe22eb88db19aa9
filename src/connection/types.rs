//! User-action records and the queue features report into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// What kind of observation a [`UserAction`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Logon,
    Logoff,
    Away,
    Back,
    Process,
    Print,
    FileIo,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Logon => "logon",
            ActionKind::Logoff => "logoff",
            ActionKind::Away => "away",
            ActionKind::Back => "back",
            ActionKind::Process => "process",
            ActionKind::Print => "print",
            ActionKind::FileIo => "file_io",
        };
        f.write_str(s)
    }
}

/// Who the agent reports for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub computer: String,
}

/// One observation sent to the collector as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub kind: ActionKind,
    pub message: String,
    pub user: String,
    pub computer: String,
    pub timestamp: DateTime<Utc>,
}

impl UserAction {
    pub fn new(identity: &Identity, kind: ActionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            user: identity.user.clone(),
            computer: identity.computer.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Encodes the record as a newline-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Queue of observations produced during one loop iteration.
///
/// Features never talk to the connection directly; they report here and the
/// scheduler delivers the queue after dispatch.
#[derive(Debug, Default)]
pub struct ActionSink {
    identity: Identity,
    queue: VecDeque<UserAction>,
}

impl ActionSink {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            queue: VecDeque::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Records one observation.
    pub fn report(&mut self, kind: ActionKind, message: impl Into<String>) {
        let action = UserAction::new(&self.identity, kind, message);
        tracing::debug!(kind = %action.kind, message = %action.message, "User action");
        self.queue.push_back(action);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Takes every queued action, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = UserAction> + '_ {
        self.queue.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            user: "alice".to_string(),
            computer: "ws-01".to_string(),
        }
    }

    #[test]
    fn test_sink_stamps_identity() {
        let mut sink = ActionSink::new(identity());
        sink.report(ActionKind::Process, "notepad.exe started");
        sink.report(ActionKind::Print, "job queued");

        assert_eq!(sink.len(), 2);
        let actions: Vec<_> = sink.drain().collect();
        assert!(sink.is_empty());
        assert_eq!(actions[0].kind, ActionKind::Process);
        assert_eq!(actions[0].user, "alice");
        assert_eq!(actions[1].computer, "ws-01");
    }

    #[test]
    fn test_line_encoding() {
        let action = UserAction::new(&identity(), ActionKind::FileIo, "created /tmp/a");
        let line = action.to_line().unwrap();

        assert_eq!(line.last(), Some(&b'\n'));
        let text = String::from_utf8(line).unwrap();
        assert!(text.contains("\"kind\":\"file_io\""));
        assert!(text.contains("\"user\":\"alice\""));
        assert_eq!(text.matches('\n').count(), 1);
    }
}
