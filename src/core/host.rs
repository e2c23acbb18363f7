//! Collaborator interfaces the poller drives
//!
//! The poller never touches a socket, a timer or the page directly. Each
//! platform (browser, native CLI, tests) supplies these.

use std::time::Duration;

use super::{ConnectionId, Result, StatusMessage, TimerId, TimerKind};
use crate::ws_state::ConnectionStatus;

/// A live, message-framed, full-duplex connection. Not reusable after close.
pub trait Transport {
    /// True while the connection is open and accepting sends.
    fn is_open(&self) -> bool;

    /// Bytes queued by `send` that have not yet gone out.
    fn buffered_amount(&self) -> usize;

    /// Queue a text frame. Non-blocking.
    fn send(&mut self, text: &str) -> Result<()>;

    /// Start a clean close handshake.
    fn close(&mut self) -> Result<()>;
}

/// Opens connections.
///
/// The returned socket is subscribed to the poller: its open, close,
/// message and error notifications arrive later as `Event`s tagged with
/// `conn`. Connection failures are reported the same way (an unclean
/// close), so `connect` only errors when an attempt cannot even start.
pub trait Connector {
    type Socket: Transport;

    fn connect(&mut self, endpoint: &str, conn: ConnectionId) -> Result<Self::Socket>;
}

/// Single-threaded timer facility plus page focus.
pub trait Host {
    /// Arrange for `Event::Timer(id)` to be delivered after `delay`.
    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> Result<TimerId>;

    /// Cancel a pending timer. Cancelling an already fired or cancelled
    /// timer is a no-op.
    fn cancel(&mut self, timer: TimerId);

    /// Arrange for `Event::Frame` at the next paint opportunity. On error no
    /// frame will be delivered.
    fn request_frame(&mut self) -> Result<()>;

    /// Whether the page currently has input focus.
    fn has_focus(&self) -> bool;
}

/// Receives what should be on screen.
pub trait DisplaySink {
    fn show_status(&mut self, status: ConnectionStatus);

    /// Apply a decoded record. Absent fields leave the displayed value.
    fn show_update(&mut self, update: &StatusMessage);
}
