//! Event vocabulary for the poller
//!
//! This module contains:
//! - Identifiers for connection attempts and scheduled timers
//! - Page visibility states
//! - The `Event` enum every transport, timer and visibility source feeds in

use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifies one connection attempt. A fresh id is issued on every
/// `connect()`, so notifications from a discarded socket can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Handle for a scheduled one-shot timer, issued by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// What a scheduled timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Send a keepalive poll.
    Poll,
    /// Open a fresh connection after an unclean close.
    Reconnect,
}

impl TimerKind {
    pub fn name(self) -> &'static str {
        match self {
            TimerKind::Poll => "poll",
            TimerKind::Reconnect => "reconnect",
        }
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// Page visibility signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
    /// Page is going away; final teardown.
    Terminating,
    /// Page came back from the back/forward cache.
    Restored,
}

impl Visibility {
    /// Map a `pagehide` (`showing == false`) or `pageshow` notification.
    ///
    /// Every hide tears the connection down, since an open socket keeps the
    /// page out of the back/forward cache. Only a show from that cache
    /// needs a reconnect; a fresh load connects on its own.
    pub fn from_page_transition(showing: bool, persisted: bool) -> Option<Self> {
        match (showing, persisted) {
            (false, _) => Some(Visibility::Terminating),
            (true, true) => Some(Visibility::Restored),
            (true, false) => None,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// A single input to the poller. Events are handled one at a time, to
/// completion, on one logical thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Connection became ready.
    Open(ConnectionId),
    /// Connection ended. `was_clean` is false on abnormal loss.
    Close { conn: ConnectionId, was_clean: bool },
    /// Inbound text frame.
    Message { conn: ConnectionId, payload: String },
    /// Transport-level error report. Informational only.
    Error { conn: ConnectionId, message: String },
    /// A scheduled timer fired.
    Timer(TimerId),
    /// Next paint opportunity after a frame request.
    Frame,
    Visibility(Visibility),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_transitions_map_to_teardown_and_restore() {
        assert_eq!(
            Visibility::from_page_transition(false, false),
            Some(Visibility::Terminating)
        );
        assert_eq!(
            Visibility::from_page_transition(false, true),
            Some(Visibility::Terminating)
        );
        assert_eq!(
            Visibility::from_page_transition(true, true),
            Some(Visibility::Restored)
        );
        assert_eq!(Visibility::from_page_transition(true, false), None);
    }

    #[test]
    fn ids_display_with_prefix() {
        assert_eq!(ConnectionId(3).to_string(), "conn#3");
        assert_eq!(TimerId(12).to_string(), "timer#12");
    }
}
