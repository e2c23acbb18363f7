//! Connection lifecycle state machine
//!
//! Owns the live connection, the pending poll timer and the pending
//! reconnect timer. Transport, timer and visibility notifications come in
//! as `Event`s; the poller reacts by scheduling or cancelling timers,
//! sending polls, opening and closing connections, and pushing values to
//! the display.
//!
//! Handle invariants, checked after every event in debug builds:
//! - at most one poll timer and at most one reconnect timer are pending
//! - a poll timer only exists while `Active` with a connection held
//! - a reconnect timer only exists while no connection is held

use tracing::{debug, error, info, trace, warn};

use super::config::{scaled_interval, PollerConfig};
use super::host::{Connector, DisplaySink, Host, Transport};
use super::parser::{parse_status, POLL_FRAME};
use super::{ConnectionId, Event, StatusMessage, TimerId, TimerKind, Visibility};
use crate::ws_state::{ConnectionPhase, ConnectionStatus};

/// The connection currently owned by the poller
struct Live<S> {
    id: ConnectionId,
    socket: S,
}

pub struct Poller<C: Connector, H: Host, D: DisplaySink> {
    config: PollerConfig,
    connector: C,
    host: H,
    display: D,
    connection: Option<Live<C::Socket>>,
    poll_timer: Option<TimerId>,
    reconnect_timer: Option<TimerId>,
    phase: ConnectionPhase,
    /// Single-slot display deferral; newer fields overwrite older ones
    pending_update: Option<StatusMessage>,
    frame_requested: bool,
    last_connection: u64,
}

impl<C: Connector, H: Host, D: DisplaySink> Poller<C, H, D> {
    pub fn new(config: PollerConfig, connector: C, host: H, display: D) -> Self {
        Self {
            config,
            connector,
            host,
            display,
            connection: None,
            poll_timer: None,
            reconnect_timer: None,
            phase: ConnectionPhase::Disconnected,
            pending_update: None,
            frame_requested: false,
            last_connection: 0,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|live| live.id)
    }

    pub fn poll_pending(&self) -> bool {
        self.poll_timer.is_some()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Dispatch one event to completion.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Open(conn) => self.on_open(conn),
            Event::Close { conn, was_clean } => self.on_close(conn, was_clean),
            Event::Message { conn, payload } => self.on_message(conn, &payload),
            Event::Error { conn, message } => self.on_error(conn, &message),
            Event::Timer(timer) => self.on_timer(timer),
            Event::Frame => self.on_frame(),
            Event::Visibility(Visibility::Hidden) => self.on_hidden(),
            Event::Visibility(Visibility::Visible) => self.on_visible(),
            Event::Visibility(Visibility::Terminating) => self.close(),
            Event::Visibility(Visibility::Restored) => self.on_restored(),
        }
        self.check_invariants();
    }

    /// Open a fresh connection to the endpoint.
    ///
    /// Any previous connection is dropped without a close handshake; its
    /// late notifications are ignored.
    pub fn connect(&mut self) {
        self.cancel_poll();
        self.cancel_reconnect();

        if let Some(old) = self.connection.take() {
            debug!(conn = %old.id, "Discarding previous connection");
        }

        self.last_connection += 1;
        let conn = ConnectionId(self.last_connection);
        info!(conn = %conn, endpoint = %self.config.endpoint, "Connecting");

        match self.connector.connect(&self.config.endpoint, conn) {
            Ok(socket) => {
                self.connection = Some(Live { id: conn, socket });
                self.phase = ConnectionPhase::Connecting;
            }
            Err(e) => {
                error!(conn = %conn, error = %e, "Failed to start connection");
                self.phase = ConnectionPhase::Disconnected;
                self.display.show_status(ConnectionStatus::Disconnected);
                self.schedule_reconnect();
            }
        }
        self.check_invariants();
    }

    pub fn on_open(&mut self, conn: ConnectionId) {
        if !self.is_current(conn) {
            debug!(conn = %conn, "Ignoring open from stale connection");
            return;
        }
        info!(conn = %conn, "WebSocket connected");
        self.resume();
    }

    pub fn on_close(&mut self, conn: ConnectionId, was_clean: bool) {
        if !self.is_current(conn) {
            debug!(conn = %conn, was_clean, "Ignoring close from stale connection");
            return;
        }
        self.cancel_poll();
        self.connection = None;
        self.phase = ConnectionPhase::Disconnected;

        if was_clean {
            info!(conn = %conn, "WebSocket closed cleanly");
        } else {
            warn!(conn = %conn, "WebSocket closed uncleanly");
            self.display.show_status(ConnectionStatus::Disconnected);
            self.schedule_reconnect();
        }
    }

    /// Decode a status frame, defer it to the next paint, and push the
    /// next poll out by one interval.
    pub fn on_message(&mut self, conn: ConnectionId, payload: &str) {
        if !self.is_current(conn) {
            trace!(conn = %conn, "Ignoring message from stale connection");
            return;
        }

        match parse_status(payload) {
            Ok(update) => {
                match self.pending_update.as_mut() {
                    Some(pending) => pending.merge(update),
                    None => self.pending_update = Some(update),
                }
                if !self.frame_requested {
                    match self.host.request_frame() {
                        Ok(()) => self.frame_requested = true,
                        Err(e) => warn!(error = %e, "Failed to request frame"),
                    }
                }
            }
            Err(e) => {
                warn!(conn = %conn, error = %e, "Dropping undecodable status frame");
            }
        }

        // Re-arm even on decode failure so junk traffic cannot stall polling.
        if self.phase.is_active() {
            self.schedule_poll();
        }
    }

    pub fn on_error(&mut self, conn: ConnectionId, message: &str) {
        if self.is_current(conn) {
            warn!(conn = %conn, error = %message, "WebSocket error");
        } else {
            trace!(conn = %conn, error = %message, "Error from stale connection");
        }
    }

    pub fn on_timer(&mut self, timer: TimerId) {
        if self.poll_timer == Some(timer) {
            self.poll_timer = None;
            self.send_poll();
        } else if self.reconnect_timer == Some(timer) {
            self.reconnect_timer = None;
            debug!(timer = %timer, "Reconnect timer fired");
            self.connect();
        } else {
            trace!(timer = %timer, "Ignoring stale timer");
        }
    }

    /// Flush the deferred display update.
    pub fn on_frame(&mut self) {
        self.frame_requested = false;
        if let Some(update) = self.pending_update.take() {
            self.display.show_update(&update);
        }
    }

    /// Page hidden: stop polling but keep the connection.
    pub fn on_hidden(&mut self) {
        debug!(phase = ?self.phase, "Page hidden");
        self.display.show_status(ConnectionStatus::Paused);
        self.cancel_poll();
        if self.phase.is_active() {
            self.phase = ConnectionPhase::Paused;
        }
    }

    /// Page visible: resume polling if the connection survived the pause.
    pub fn on_visible(&mut self) {
        let open = self
            .connection
            .as_ref()
            .is_some_and(|live| live.socket.is_open());
        debug!(phase = ?self.phase, open, "Page visible");

        if self.poll_timer.is_none() && open {
            self.resume();
        }
    }

    /// Page came back from the back/forward cache. The socket was torn down
    /// on the way in, so open a fresh one unless an open one is still held.
    pub fn on_restored(&mut self) {
        let open = self
            .connection
            .as_ref()
            .is_some_and(|live| live.socket.is_open());
        if open {
            debug!(phase = ?self.phase, "Page restored with an open connection");
            return;
        }
        info!("Page restored, reconnecting");
        self.connect();
    }

    /// Final teardown. Safe to call more than once.
    pub fn close(&mut self) {
        self.cancel_reconnect();
        self.cancel_poll();
        if let Some(mut live) = self.connection.take() {
            info!(conn = %live.id, "Closing connection");
            if let Err(e) = live.socket.close() {
                warn!(conn = %live.id, error = %e, "Close failed");
            }
        }
        self.phase = ConnectionPhase::Disconnected;
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn is_current(&self, conn: ConnectionId) -> bool {
        self.connection.as_ref().is_some_and(|live| live.id == conn)
    }

    fn resume(&mut self) {
        self.phase = ConnectionPhase::Active;
        self.display.show_status(ConnectionStatus::Connected);
        self.schedule_poll();
    }

    fn schedule_poll(&mut self) {
        self.cancel_poll();

        let open = self
            .connection
            .as_ref()
            .is_some_and(|live| live.socket.is_open());
        if !open {
            trace!("Not scheduling poll, connection not open");
            return;
        }

        let delay = scaled_interval(self.config.poll_interval, self.host.has_focus());
        match self.host.schedule(TimerKind::Poll, delay) {
            Ok(timer) => {
                trace!(timer = %timer, delay_ms = delay.as_millis() as u64, "Poll scheduled");
                self.poll_timer = Some(timer);
            }
            Err(e) => error!(error = %e, "Failed to schedule poll"),
        }
    }

    fn cancel_poll(&mut self) {
        if let Some(timer) = self.poll_timer.take() {
            self.host.cancel(timer);
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();

        let delay = scaled_interval(self.config.reconnect_interval, self.host.has_focus());
        match self.host.schedule(TimerKind::Reconnect, delay) {
            Ok(timer) => {
                info!(timer = %timer, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
                self.reconnect_timer = Some(timer);
            }
            Err(e) => error!(error = %e, "Failed to schedule reconnect"),
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            self.host.cancel(timer);
        }
    }

    /// Fire one poll, skipping it under back-pressure, then re-arm.
    fn send_poll(&mut self) {
        let Some(live) = self.connection.as_mut() else {
            return;
        };
        if !live.socket.is_open() {
            debug!(conn = %live.id, "Poll timer fired on a connection that is not open");
            return;
        }

        let buffered = live.socket.buffered_amount();
        if buffered == 0 {
            if let Err(e) = live.socket.send(POLL_FRAME) {
                warn!(conn = %live.id, error = %e, "Failed to send poll");
            }
        } else {
            trace!(conn = %live.id, buffered, "Skipping poll, writes still buffered");
        }

        self.schedule_poll();
    }

    fn check_invariants(&self) {
        if self.poll_timer.is_some() {
            debug_assert!(self.connection.is_some(), "poll timer without a connection");
            debug_assert!(self.phase.is_active(), "poll timer outside Active");
        }
        if self.reconnect_timer.is_some() {
            debug_assert!(self.connection.is_none(), "reconnect timer with a live connection");
        }
        debug_assert_eq!(
            self.phase.has_connection(),
            self.connection.is_some(),
            "phase {:?} disagrees with connection handle",
            self.phase
        );
    }
}
