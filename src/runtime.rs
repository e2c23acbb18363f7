//! Native event loop for the CLI
//!
//! Everything the poller reacts to (socket notifications, timer firings,
//! frame requests, signals) is funnelled through one unbounded channel and
//! handled one event at a time on a current-thread runtime.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::core::{
    ConnectionId, DisplaySink, Error, Event, Host, Poller, PollerConfig, Result, StatusBoard,
    StatusMessage, TimerId, TimerKind, Visibility,
};
use crate::websocket_native::{EventSender, NativeConnector};
use crate::ws_state::ConnectionStatus;

/// How long teardown waits for the server to acknowledge the close
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Interval between stats log lines
const STATS_INTERVAL: Duration = Duration::from_secs(5);

pub type NativePoller = Poller<NativeConnector, NativeHost, LogDisplay>;

/// Tokio-backed timers. A native process has no page focus, so focus is a
/// fixed setting.
pub struct NativeHost {
    events: EventSender,
    timers: HashMap<TimerId, JoinHandle<()>>,
    last_timer: u64,
    focused: bool,
}

impl NativeHost {
    pub fn new(events: EventSender, focused: bool) -> Self {
        Self {
            events,
            timers: HashMap::new(),
            last_timer: 0,
            focused,
        }
    }
}

impl Host for NativeHost {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> Result<TimerId> {
        self.last_timer += 1;
        let id = TimerId(self.last_timer);
        self.timers.retain(|_, handle| !handle.is_finished());

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Timer(id));
        });
        self.timers.insert(id, handle);

        trace!(timer = %id, kind = kind.name(), delay_ms = delay.as_millis() as u64, "Timer armed");
        Ok(id)
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(handle) = self.timers.remove(&timer) {
            handle.abort();
        }
    }

    fn request_frame(&mut self) -> Result<()> {
        self.events
            .send(Event::Frame)
            .map_err(|_| Error::timer("event loop is gone"))
    }

    fn has_focus(&self) -> bool {
        self.focused
    }
}

/// Display sink that keeps the board in memory and logs changes
#[derive(Default)]
pub struct LogDisplay {
    board: StatusBoard,
    status: Option<ConnectionStatus>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn status(&self) -> Option<ConnectionStatus> {
        self.status
    }
}

impl DisplaySink for LogDisplay {
    fn show_status(&mut self, status: ConnectionStatus) {
        if self.status != Some(status) {
            info!(%status, "Status");
        }
        self.status = Some(status);
    }

    fn show_update(&mut self, update: &StatusMessage) {
        self.board.apply(update);
        debug!(
            hostname = ?self.board.hostname,
            username = ?self.board.username,
            pid = ?self.board.pid,
            clients = ?self.board.clients,
            msgs = ?self.board.msgs,
            "Status update"
        );
    }
}

/// Map process signals onto visibility changes: Ctrl-C terminates, and on
/// unix SIGUSR1/SIGUSR2 hide and show.
pub fn spawn_signal_handlers(events: EventSender) {
    let tx = events.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                let _ = tx.send(Event::Visibility(Visibility::Terminating));
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, visibility) in [
            (SignalKind::user_defined1(), Visibility::Hidden),
            (SignalKind::user_defined2(), Visibility::Visible),
        ] {
            let tx = events.clone();
            match signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        while stream.recv().await.is_some() {
                            debug!(?visibility, "Visibility signal");
                            if tx.send(Event::Visibility(visibility)).is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => warn!(error = %e, "Failed to install visibility signal handler"),
            }
        }
    }
}

/// Build a poller wired to a fresh event channel.
pub fn native_poller(
    config: PollerConfig,
    focused: bool,
) -> (NativePoller, EventSender, UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let poller = Poller::new(
        config,
        NativeConnector::new(tx.clone()),
        NativeHost::new(tx.clone(), focused),
        LogDisplay::new(),
    );
    (poller, tx, rx)
}

/// Connect and process events until terminated.
pub async fn run(config: PollerConfig, focused: bool) -> Result<()> {
    let (mut poller, tx, mut rx) = native_poller(config, focused);
    spawn_signal_handlers(tx);

    poller.connect();

    let mut stats = tokio::time::interval(STATS_INTERVAL);
    stats.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if event == Event::Visibility(Visibility::Terminating) {
                    let closing = poller.connection_id();
                    poller.handle(event);
                    if let Some(conn) = closing {
                        await_close(&mut rx, conn).await;
                    }
                    break;
                }
                poller.handle(event);
            }
            _ = stats.tick() => {
                let board = poller.display().board();
                info!(
                    phase = ?poller.phase(),
                    status = ?poller.display().status(),
                    hostname = ?board.hostname,
                    clients = ?board.clients,
                    updates = board.updates,
                    age_s = ?board.age().map(|a| format!("{:.1}", a)),
                    "stats"
                );
            }
        }
    }

    Ok(())
}

/// Give the close handshake of `conn` a moment so the server sees a clean
/// close. Everything else still in the channel is dropped.
async fn await_close(rx: &mut UnboundedReceiver<Event>, conn: ConnectionId) -> bool {
    let drained = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(event) = rx.recv().await {
            if matches!(event, Event::Close { conn: closed, .. } if closed == conn) {
                return true;
            }
        }
        false
    })
    .await;
    match drained {
        Ok(closed) => closed,
        Err(_) => {
            debug!(conn = %conn, "Close handshake did not finish in time");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws_state::ConnectionPhase;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn timer_fires_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = NativeHost::new(tx, true);

        let id = host.schedule(TimerKind::Poll, Duration::from_millis(5)).unwrap();
        assert_eq!(rx.recv().await, Some(Event::Timer(id)));
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = NativeHost::new(tx, true);

        let cancelled = host.schedule(TimerKind::Reconnect, Duration::from_millis(20)).unwrap();
        host.cancel(cancelled);
        let kept = host.schedule(TimerKind::Poll, Duration::from_millis(40)).unwrap();

        assert_eq!(rx.recv().await, Some(Event::Timer(kept)));
        assert!(rx.try_recv().is_err());
        // Cancelling twice is harmless
        host.cancel(cancelled);
    }

    #[tokio::test]
    async fn frame_request_is_queued() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut host = NativeHost::new(tx, false);

        host.request_frame().unwrap();
        assert_eq!(rx.recv().await, Some(Event::Frame));
        assert!(!host.has_focus());

        drop(rx);
        assert!(host.request_frame().is_err());
    }

    #[tokio::test]
    async fn close_wait_skips_stale_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let current = ConnectionId(2);
        tx.send(Event::Close { conn: ConnectionId(1), was_clean: false }).unwrap();
        tx.send(Event::Frame).unwrap();
        tx.send(Event::Close { conn: current, was_clean: true }).unwrap();
        tx.send(Event::Frame).unwrap();

        assert!(await_close(&mut rx, current).await);
        // Stops right after the matching close.
        assert_eq!(rx.try_recv(), Ok(Event::Frame));
    }

    #[tokio::test]
    async fn close_wait_gives_up_after_grace() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Event::Close { conn: ConnectionId(1), was_clean: true }).unwrap();

        let started = std::time::Instant::now();
        assert!(!await_close(&mut rx, ConnectionId(2)).await);
        assert!(started.elapsed() >= CLOSE_GRACE);
        drop(tx);
    }

    #[test]
    fn log_display_merges_updates() {
        let mut display = LogDisplay::new();
        display.show_status(ConnectionStatus::Connected);
        display.show_update(&StatusMessage {
            hostname: Some("h".into()),
            clients: Some(2),
            ..Default::default()
        });
        display.show_update(&StatusMessage {
            clients: Some(5),
            ..Default::default()
        });

        assert_eq!(display.status(), Some(ConnectionStatus::Connected));
        assert_eq!(display.board().hostname.as_deref(), Some("h"));
        assert_eq!(display.board().clients, Some(5));
        assert_eq!(display.board().updates, 2);
    }

    #[tokio::test]
    async fn polls_server_and_displays_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Answers every poll with a status record, like the real server.
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let mut polls = 0u64;
            while let Some(Ok(msg)) = ws.next().await {
                if msg == Message::Text("!".into()) {
                    polls += 1;
                    let reply = format!(
                        r#"{{"hostname":"h","username":"u","pid":42,"clients":7,"msgs":{}}}"#,
                        polls
                    );
                    if ws.send(Message::Text(reply.into())).await.is_err() {
                        break;
                    }
                }
            }
            polls
        });

        let config = PollerConfig::new(format!("ws://{}/ws", addr))
            .with_poll_interval(Duration::from_millis(5));
        let (mut poller, _tx, mut rx) = native_poller(config, true);
        poller.connect();

        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                poller.handle(event);
                if poller.display().board().msgs >= Some(3) {
                    break;
                }
            }
        })
        .await;
        assert!(reached.is_ok(), "no status updates arrived");

        assert_eq!(poller.phase(), ConnectionPhase::Active);
        let board = poller.display().board();
        assert_eq!(board.hostname.as_deref(), Some("h"));
        assert_eq!(board.pid, Some(42));
        assert_eq!(board.clients, Some(7));

        poller.handle(Event::Visibility(Visibility::Terminating));
        assert_eq!(poller.phase(), ConnectionPhase::Disconnected);
        assert!(!poller.poll_pending());

        let polls = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not see the close")
            .unwrap();
        assert!(polls >= 3);
    }
}
