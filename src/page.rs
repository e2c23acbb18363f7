//! Browser glue: timers, paint scheduling, DOM display and page visibility
//!
//! All browser callbacks post into one `Dispatcher`, which hands events to
//! the poller one at a time. A callback that fires while the poller is
//! already handling an event only queues; the outer drain picks it up.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, info, trace};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, PageTransitionEvent, VisibilityState, Window};

use crate::core::{
    DisplaySink, Error, Event, Host, Poller, PollerConfig, Result, StatusMessage, TimerId,
    TimerKind, Visibility,
};
use crate::websocket_wasm::{js_error, EventSink, WasmConnector};
use crate::ws_state::ConnectionStatus;

pub type BrowserPoller = Poller<WasmConnector, BrowserHost, DomDisplay>;

// ============================================================================
// Dispatcher
// ============================================================================

/// Run-to-completion event queue in front of the poller
pub struct Dispatcher {
    queue: RefCell<VecDeque<Event>>,
    poller: RefCell<Option<BrowserPoller>>,
}

impl Dispatcher {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            queue: RefCell::new(VecDeque::new()),
            poller: RefCell::new(None),
        })
    }

    /// Sink for callbacks. Holds only a weak reference.
    pub fn sink(self: &Rc<Self>) -> EventSink {
        let weak: Weak<Self> = Rc::downgrade(self);
        Rc::new(move |event| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.post(event);
            }
        })
    }

    pub fn install(&self, poller: BrowserPoller) {
        *self.poller.borrow_mut() = Some(poller);
        self.drain();
    }

    pub fn post(&self, event: Event) {
        self.queue.borrow_mut().push_back(event);
        self.drain();
    }

    /// Run `f` against the poller, then process anything it queued.
    pub fn with_poller(&self, f: impl FnOnce(&mut BrowserPoller)) {
        if let Ok(mut guard) = self.poller.try_borrow_mut() {
            if let Some(poller) = guard.as_mut() {
                f(poller);
            }
        }
        self.drain();
    }

    fn drain(&self) {
        // Someone further up the stack is already draining.
        let Ok(mut guard) = self.poller.try_borrow_mut() else {
            return;
        };
        let Some(poller) = guard.as_mut() else {
            return;
        };
        loop {
            let next = self.queue.borrow_mut().pop_front();
            match next {
                Some(event) => poller.handle(event),
                None => break,
            }
        }
    }
}

// ============================================================================
// Host
// ============================================================================

/// One reusable setTimeout callback. Only one timer per kind is ever armed.
struct TimerSlot {
    armed: Rc<Cell<Option<(TimerId, i32)>>>,
    callback: Closure<dyn Fn()>,
}

impl TimerSlot {
    fn new(sink: EventSink) -> Self {
        let armed: Rc<Cell<Option<(TimerId, i32)>>> = Rc::new(Cell::new(None));
        let armed_clone = armed.clone();
        let callback = Closure::wrap(Box::new(move || {
            if let Some((id, _)) = armed_clone.take() {
                sink(Event::Timer(id));
            }
        }) as Box<dyn Fn()>);
        Self { armed, callback }
    }
}

/// Timers via `setTimeout`, frames via `requestAnimationFrame`, focus via
/// `document.hasFocus()`.
pub struct BrowserHost {
    window: Window,
    document: Document,
    poll: TimerSlot,
    reconnect: TimerSlot,
    last_timer: u64,
    frame_pending: Rc<Cell<bool>>,
    frame_callback: Closure<dyn Fn(JsValue)>,
}

impl BrowserHost {
    pub fn new(window: Window, document: Document, sink: EventSink) -> Self {
        let frame_pending = Rc::new(Cell::new(false));
        let pending = frame_pending.clone();
        let frame_sink = sink.clone();
        let frame_callback = Closure::wrap(Box::new(move |_| {
            pending.set(false);
            frame_sink(Event::Frame);
        }) as Box<dyn Fn(JsValue)>);

        Self {
            window,
            document,
            poll: TimerSlot::new(sink.clone()),
            reconnect: TimerSlot::new(sink),
            last_timer: 0,
            frame_pending,
            frame_callback,
        }
    }

    fn slot(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Poll => &self.poll,
            TimerKind::Reconnect => &self.reconnect,
        }
    }
}

impl Host for BrowserHost {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) -> Result<TimerId> {
        self.last_timer += 1;
        let id = TimerId(self.last_timer);
        let slot = self.slot(kind);

        if let Some((stale, handle)) = slot.armed.take() {
            trace!(timer = %stale, "Replacing armed timer");
            self.window.clear_timeout_with_handle(handle);
        }

        let handle = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                slot.callback.as_ref().unchecked_ref(),
                delay.as_millis().min(i32::MAX as u128) as i32,
            )
            .map_err(|e| Error::timer(js_error(e)))?;
        slot.armed.set(Some((id, handle)));
        Ok(id)
    }

    fn cancel(&mut self, timer: TimerId) {
        for slot in [&self.poll, &self.reconnect] {
            match slot.armed.get() {
                Some((id, handle)) if id == timer => {
                    self.window.clear_timeout_with_handle(handle);
                    slot.armed.set(None);
                }
                _ => {}
            }
        }
    }

    fn request_frame(&mut self) -> Result<()> {
        if self.frame_pending.get() {
            return Ok(());
        }
        self.window
            .request_animation_frame(self.frame_callback.as_ref().unchecked_ref())
            .map_err(|e| Error::timer(js_error(e)))?;
        self.frame_pending.set(true);
        Ok(())
    }

    fn has_focus(&self) -> bool {
        self.document.has_focus().unwrap_or(true)
    }
}

// ============================================================================
// Display
// ============================================================================

/// Writes values into elements by id: `status`, `hostname`, `username`,
/// `pid`, `clients`, `msgs`.
pub struct DomDisplay {
    document: Document,
}

impl DomDisplay {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn set_text(&self, id: &str, text: &str) {
        match self.document.get_element_by_id(id) {
            Some(el) => el.set_text_content(Some(text)),
            None => trace!(id, "No element to update"),
        }
    }
}

impl DisplaySink for DomDisplay {
    fn show_status(&mut self, status: ConnectionStatus) {
        self.set_text("status", status.as_str());
    }

    fn show_update(&mut self, update: &StatusMessage) {
        if let Some(hostname) = &update.hostname {
            self.set_text("hostname", hostname);
        }
        if let Some(username) = &update.username {
            self.set_text("username", username);
        }
        if let Some(pid) = update.pid {
            self.set_text("pid", &pid.to_string());
        }
        if let Some(clients) = update.clients {
            self.set_text("clients", &clients.to_string());
        }
        if let Some(msgs) = update.msgs {
            self.set_text("msgs", &msgs.to_string());
        }
    }
}

// ============================================================================
// Visibility
// ============================================================================

/// `visibilitychange` maps to hidden/visible, `pagehide` to teardown and a
/// `pageshow` from the back/forward cache to a reconnect. Listeners live as
/// long as the page.
pub fn install_visibility_listeners(document: &Document, sink: EventSink) -> Result<()> {
    let doc = document.clone();
    let change_sink = sink.clone();
    let on_change = Closure::wrap(Box::new(move |_: web_sys::Event| {
        let visibility = match doc.visibility_state() {
            VisibilityState::Hidden => Visibility::Hidden,
            VisibilityState::Visible => Visibility::Visible,
            _ => return,
        };
        change_sink(Event::Visibility(visibility));
    }) as Box<dyn Fn(web_sys::Event)>);
    document
        .add_event_listener_with_callback("visibilitychange", on_change.as_ref().unchecked_ref())
        .map_err(|e| Error::config(js_error(e)))?;
    on_change.forget();

    let window = web_sys::window().ok_or_else(|| Error::config("no window"))?;
    for (name, showing) in [("pagehide", false), ("pageshow", true)] {
        let transition_sink = sink.clone();
        let on_transition = Closure::wrap(Box::new(move |e: PageTransitionEvent| {
            let persisted = e.persisted();
            debug!(event = name, persisted, "Page transition");
            if let Some(visibility) = Visibility::from_page_transition(showing, persisted) {
                transition_sink(Event::Visibility(visibility));
            }
        }) as Box<dyn Fn(PageTransitionEvent)>);
        window
            .add_event_listener_with_callback(name, on_transition.as_ref().unchecked_ref())
            .map_err(|e| Error::config(js_error(e)))?;
        on_transition.forget();
    }

    Ok(())
}

thread_local! {
    static DISPATCHER: RefCell<Option<Rc<Dispatcher>>> = const { RefCell::new(None) };
}

/// Build the poller for this page and connect.
pub fn start() -> std::result::Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let config = PollerConfig::for_page_host(&window.location().host()?);
    info!(url = %config.endpoint, "Starting status poller");

    let dispatcher = Dispatcher::new();
    let sink = dispatcher.sink();
    let poller = Poller::new(
        config,
        WasmConnector::new(sink.clone()),
        BrowserHost::new(window, document.clone(), sink.clone()),
        DomDisplay::new(document.clone()),
    );
    dispatcher.install(poller);
    install_visibility_listeners(&document, sink)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    dispatcher.with_poller(|poller| poller.connect());

    DISPATCHER.with(|slot| *slot.borrow_mut() = Some(dispatcher));
    Ok(())
}
