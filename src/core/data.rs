//! Data structures for status records pushed by the server
//!
//! These structures are platform-agnostic (no WASM deps) and shared
//! between the CLI and the browser client.

use serde::Deserialize;
use tracing::trace;

use crate::time::now_seconds;

/// One decoded status frame.
///
/// The server's field set varies slightly between versions, so every field
/// is optional. Absent fields mean "leave the previous value displayed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusMessage {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub pid: Option<u64>,
    #[serde(default)]
    pub clients: Option<u64>,
    /// Server-side message counter, only sent by newer servers.
    #[serde(default)]
    pub msgs: Option<u64>,
}

impl StatusMessage {
    pub fn is_empty(&self) -> bool {
        self.hostname.is_none()
            && self.username.is_none()
            && self.pid.is_none()
            && self.clients.is_none()
            && self.msgs.is_none()
    }

    /// Fold a newer frame into this one. Fields the newer frame omits keep
    /// their current value.
    pub fn merge(&mut self, newer: StatusMessage) {
        if newer.hostname.is_some() {
            self.hostname = newer.hostname;
        }
        if newer.username.is_some() {
            self.username = newer.username;
        }
        if newer.pid.is_some() {
            self.pid = newer.pid;
        }
        if newer.clients.is_some() {
            self.clients = newer.clients;
        }
        if newer.msgs.is_some() {
            self.msgs = newer.msgs;
        }
    }
}

/// Values currently on display
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusBoard {
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub pid: Option<u64>,
    pub clients: Option<u64>,
    pub msgs: Option<u64>,
    /// `now_seconds()` at the last applied update
    pub updated_at: Option<f64>,
    /// Number of updates applied
    pub updates: u64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a status frame, overwriting only the fields it carries.
    pub fn apply(&mut self, msg: &StatusMessage) {
        if let Some(hostname) = &msg.hostname {
            self.hostname = Some(hostname.clone());
        }
        if let Some(username) = &msg.username {
            self.username = Some(username.clone());
        }
        if msg.pid.is_some() {
            self.pid = msg.pid;
        }
        if msg.clients.is_some() {
            self.clients = msg.clients;
        }
        if msg.msgs.is_some() {
            self.msgs = msg.msgs;
        }
        self.updated_at = Some(now_seconds());
        self.updates += 1;

        trace!(updates = self.updates, clients = ?self.clients, "Status board updated");
    }

    /// Seconds since the last applied update
    pub fn age(&self) -> Option<f64> {
        self.updated_at.map(|t| (now_seconds() - t).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> StatusMessage {
        StatusMessage {
            hostname: Some("h".into()),
            username: Some("u".into()),
            pid: Some(42),
            clients: Some(3),
            msgs: None,
        }
    }

    #[test]
    fn apply_copies_present_fields() {
        let mut board = StatusBoard::new();
        board.apply(&full());

        assert_eq!(board.hostname.as_deref(), Some("h"));
        assert_eq!(board.username.as_deref(), Some("u"));
        assert_eq!(board.pid, Some(42));
        assert_eq!(board.clients, Some(3));
        assert_eq!(board.msgs, None);
        assert_eq!(board.updates, 1);
        assert!(board.updated_at.is_some());
    }

    #[test]
    fn absent_fields_keep_previous_values() {
        let mut board = StatusBoard::new();
        board.apply(&full());
        board.apply(&StatusMessage {
            clients: Some(9),
            msgs: Some(100),
            ..Default::default()
        });

        assert_eq!(board.hostname.as_deref(), Some("h"));
        assert_eq!(board.pid, Some(42));
        assert_eq!(board.clients, Some(9));
        assert_eq!(board.msgs, Some(100));
        assert_eq!(board.updates, 2);
    }

    #[test]
    fn merge_keeps_fields_the_newer_frame_omits() {
        let mut pending = StatusMessage {
            hostname: Some("h".into()),
            clients: Some(1),
            ..Default::default()
        };
        pending.merge(StatusMessage {
            clients: Some(2),
            ..Default::default()
        });

        assert_eq!(pending.hostname.as_deref(), Some("h"));
        assert_eq!(pending.clients, Some(2));
        assert_eq!(pending.pid, None);
    }

    #[test]
    fn empty_message() {
        assert!(StatusMessage::default().is_empty());
        assert!(!full().is_empty());
    }
}
