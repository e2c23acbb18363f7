//! WASM WebSocket transport
//!
//! A browser `WebSocket` cannot be reopened, so every attempt builds a new
//! one. Its notifications are forwarded as `Event`s tagged with the attempt's
//! `ConnectionId`.

use std::rc::Rc;

use tracing::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use crate::core::{ConnectionId, Connector, Error, Event, Result, Transport};

/// Where socket, timer and page callbacks deliver their events
pub type EventSink = Rc<dyn Fn(Event)>;

pub(crate) fn js_error(e: JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{:?}", e))
}

pub struct WasmConnector {
    sink: EventSink,
}

impl WasmConnector {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }
}

impl Connector for WasmConnector {
    type Socket = WasmSocket;

    fn connect(&mut self, endpoint: &str, conn: ConnectionId) -> Result<WasmSocket> {
        let ws = WebSocket::new(endpoint).map_err(|e| Error::connect(js_error(e)))?;

        // On open
        let sink = self.sink.clone();
        let on_open = Closure::wrap(Box::new(move |_| {
            sink(Event::Open(conn));
        }) as Box<dyn Fn(JsValue)>);
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        // On message - text frames only
        let sink = self.sink.clone();
        let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
            match e.data().dyn_into::<js_sys::JsString>() {
                Ok(txt) => sink(Event::Message { conn, payload: txt.into() }),
                Err(_) => debug!(conn = %conn, "Ignoring non-text frame"),
            }
        }) as Box<dyn Fn(MessageEvent)>);
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        // On error - informational, close follows
        let sink = self.sink.clone();
        let on_error = Closure::wrap(Box::new(move |e: web_sys::Event| {
            sink(Event::Error { conn, message: e.type_() });
        }) as Box<dyn Fn(web_sys::Event)>);
        ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        // On close
        let sink = self.sink.clone();
        let on_close = Closure::wrap(Box::new(move |e: CloseEvent| {
            debug!(conn = %conn, code = e.code(), reason = %e.reason(), "WebSocket close event");
            sink(Event::Close { conn, was_clean: e.was_clean() });
        }) as Box<dyn Fn(CloseEvent)>);
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        Ok(WasmSocket {
            conn,
            ws,
            _on_open: on_open,
            _on_message: on_message,
            _on_error: on_error,
            _on_close: on_close,
        })
    }
}

/// One browser WebSocket plus the handlers subscribed to it.
///
/// Dropping it detaches the handlers; the socket itself is left to the
/// browser.
pub struct WasmSocket {
    conn: ConnectionId,
    ws: WebSocket,
    _on_open: Closure<dyn Fn(JsValue)>,
    _on_message: Closure<dyn Fn(MessageEvent)>,
    _on_error: Closure<dyn Fn(web_sys::Event)>,
    _on_close: Closure<dyn Fn(CloseEvent)>,
}

impl Transport for WasmSocket {
    fn is_open(&self) -> bool {
        self.ws.ready_state() == WebSocket::OPEN
    }

    fn buffered_amount(&self) -> usize {
        self.ws.buffered_amount() as usize
    }

    fn send(&mut self, text: &str) -> Result<()> {
        self.ws
            .send_with_str(text)
            .map_err(|e| Error::send(js_error(e)))
    }

    fn close(&mut self) -> Result<()> {
        self.ws.close().map_err(|e| Error::send(js_error(e)))
    }
}

impl Drop for WasmSocket {
    fn drop(&mut self) {
        debug!(conn = %self.conn, "Detaching WebSocket handlers");
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
    }
}
