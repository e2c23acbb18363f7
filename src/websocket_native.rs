//! Native WebSocket transport
//!
//! Uses tokio-tungstenite in a task per connection, with channel-based
//! message passing. Notifications go out as `Event`s on the poller's event
//! channel; the socket handle shares ready state and unsent byte count with
//! the task.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{ConnectionId, Connector, Error, Event, Result, Transport};

/// Sender half of the poller's event channel
pub type EventSender = UnboundedSender<Event>;

/// Mirrors the browser's `WebSocket.readyState`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

struct Shared {
    ready: ReadyState,
    /// Bytes handed to `send` and not yet written
    buffered: usize,
}

enum Outbound {
    Text(String),
    Close,
}

/// Opens tokio-tungstenite connections. Must be used inside a tokio runtime.
pub struct NativeConnector {
    events: EventSender,
}

impl NativeConnector {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

impl Connector for NativeConnector {
    type Socket = NativeSocket;

    fn connect(&mut self, endpoint: &str, conn: ConnectionId) -> Result<NativeSocket> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;

        let request = endpoint
            .into_client_request()
            .map_err(|e| Error::connect(e.to_string()))?;

        let shared = Arc::new(Mutex::new(Shared {
            ready: ReadyState::Connecting,
            buffered: 0,
        }));
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_websocket(
            request,
            conn,
            shared.clone(),
            self.events.clone(),
            outbound_rx,
        ));

        Ok(NativeSocket {
            conn,
            shared,
            outbound,
            task,
            close_requested: false,
        })
    }
}

/// Handle to one native connection.
///
/// Dropping it without `close()` stops the connection task without a close
/// handshake.
pub struct NativeSocket {
    conn: ConnectionId,
    shared: Arc<Mutex<Shared>>,
    outbound: UnboundedSender<Outbound>,
    task: JoinHandle<()>,
    close_requested: bool,
}

impl Transport for NativeSocket {
    fn is_open(&self) -> bool {
        self.shared.lock().ready == ReadyState::Open
    }

    fn buffered_amount(&self) -> usize {
        self.shared.lock().buffered
    }

    fn send(&mut self, text: &str) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.ready != ReadyState::Open {
            return Err(Error::send(format!("{} is not open", self.conn)));
        }
        shared.buffered += text.len();
        drop(shared);

        self.outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| Error::send(format!("{} task has exited", self.conn)))
    }

    fn close(&mut self) -> Result<()> {
        {
            let mut shared = self.shared.lock();
            if matches!(shared.ready, ReadyState::Closing | ReadyState::Closed) {
                return Ok(());
            }
            shared.ready = ReadyState::Closing;
        }
        self.close_requested = true;
        // The task may already be gone, in which case there is nothing to close.
        let _ = self.outbound.send(Outbound::Close);
        Ok(())
    }
}

impl Drop for NativeSocket {
    fn drop(&mut self) {
        if !self.close_requested {
            debug!(conn = %self.conn, "Dropping socket without close handshake");
            self.task.abort();
        }
    }
}

async fn run_websocket(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    conn: ConnectionId,
    shared: Arc<Mutex<Shared>>,
    events: EventSender,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

    info!(conn = %conn, uri = %request.uri(), "Connecting to WebSocket");

    let ws_stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            error!(conn = %conn, error = %e, "Failed to connect");
            shared.lock().ready = ReadyState::Closed;
            let _ = events.send(Event::Error { conn, message: e.to_string() });
            let _ = events.send(Event::Close { conn, was_clean: false });
            return;
        }
    };

    {
        let mut shared = shared.lock();
        // close() may have raced the handshake
        if shared.ready == ReadyState::Connecting {
            shared.ready = ReadyState::Open;
        }
    }
    let _ = events.send(Event::Open(conn));

    let (mut write, mut read) = ws_stream.split();
    let mut outbound_open = true;
    let mut close_seen = false;

    if shared.lock().ready == ReadyState::Closing {
        close_seen = true;
        if let Err(e) = write.send(Message::Close(None)).await {
            warn!(conn = %conn, error = %e, "Failed to send close frame");
        }
    }

    let was_clean = loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let payload = text.to_string();
                        if events.send(Event::Message { conn, payload }).is_err() {
                            // Poller gone, nothing left to report to
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(conn = %conn, ?frame, "Close frame received");
                        close_seen = true;
                        shared.lock().ready = ReadyState::Closing;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(tungstenite::Error::ConnectionClosed)) | None => break close_seen,
                    Some(Err(e)) => {
                        warn!(conn = %conn, error = %e, "WebSocket error");
                        let _ = events.send(Event::Error { conn, message: e.to_string() });
                        break false;
                    }
                }
            }
            out = outbound.recv(), if outbound_open => {
                match out {
                    Some(Outbound::Text(text)) => {
                        let len = text.len();
                        let result = write.send(Message::Text(text.into())).await;
                        {
                            let mut shared = shared.lock();
                            shared.buffered = shared.buffered.saturating_sub(len);
                        }
                        if let Err(e) = result {
                            warn!(conn = %conn, error = %e, "Failed to send frame");
                            let _ = events.send(Event::Error { conn, message: e.to_string() });
                            break false;
                        }
                    }
                    Some(Outbound::Close) => {
                        close_seen = true;
                        if let Err(e) = write.send(Message::Close(None)).await {
                            warn!(conn = %conn, error = %e, "Failed to send close frame");
                            break false;
                        }
                    }
                    None => outbound_open = false,
                }
            }
        }
    };

    shared.lock().ready = ReadyState::Closed;
    if was_clean {
        info!(conn = %conn, "WebSocket closed");
    } else {
        warn!(conn = %conn, "WebSocket stream ended");
    }
    let _ = events.send(Event::Close { conn, was_clean });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn malformed_endpoint_fails_synchronously() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut connector = NativeConnector::new(tx);

        let result = connector.connect("not a url", ConnectionId(1));
        assert!(matches!(result, Err(Error::Connect { .. })));
    }

    #[tokio::test]
    async fn poll_and_status_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let poll = ws.next().await.unwrap().unwrap();
            assert_eq!(poll, Message::Text("!".into()));

            ws.send(Message::Text(r#"{"clients":1}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = NativeConnector::new(tx);
        let conn = ConnectionId(1);
        let mut socket = connector
            .connect(&format!("ws://{}/ws", addr), conn)
            .unwrap();

        assert_eq!(rx.recv().await, Some(Event::Open(conn)));
        assert!(socket.is_open());

        socket.send("!").unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Event::Message {
                conn,
                payload: r#"{"clients":1}"#.to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(Event::Close { conn, was_clean: true }));
        assert!(!socket.is_open());
        assert_eq!(socket.buffered_amount(), 0);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_unclean_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = NativeConnector::new(tx);
        let conn = ConnectionId(4);
        let socket = connector
            .connect(&format!("ws://{}/ws", addr), conn)
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::Error { conn: c, .. }) if c == conn));
        assert_eq!(rx.recv().await, Some(Event::Close { conn, was_clean: false }));
        assert!(!socket.is_open());
    }

    #[tokio::test]
    async fn client_close_is_clean() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut connector = NativeConnector::new(tx);
        let conn = ConnectionId(2);
        let mut socket = connector
            .connect(&format!("ws://{}/ws", addr), conn)
            .unwrap();
        assert_eq!(rx.recv().await, Some(Event::Open(conn)));

        socket.close().unwrap();
        assert!(!socket.is_open());
        assert!(socket.send("!").is_err());
        drop(socket);

        assert_eq!(rx.recv().await, Some(Event::Close { conn, was_clean: true }));
        server.await.unwrap();
    }
}
