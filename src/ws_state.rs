//! Shared WebSocket connection state
//!
//! Used by the poller core and by both WASM and native front ends.

use std::fmt;

/// Lifecycle phase of the poller's connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No connection; a reconnect may be pending.
    #[default]
    Disconnected,
    /// Socket created, waiting for open.
    Connecting,
    /// Open and polling.
    Active,
    /// Open but the page is hidden; no polls.
    Paused,
}

impl ConnectionPhase {
    pub fn has_connection(&self) -> bool {
        !matches!(self, ConnectionPhase::Disconnected)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionPhase::Active)
    }
}

/// Status text shown to the user
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Paused,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
