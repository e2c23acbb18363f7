//! Kigoron status poller - live server status over WebSocket
//!
//! Keeps one WebSocket open to the status server, polls it while idle,
//! pauses while the page is hidden and reconnects after unclean closes.
//! Runs in the browser (`--features wasm`) or as a CLI (`--features cli`).

pub mod core;
pub mod time;
pub mod ws_state;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
mod page;
#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
mod websocket_wasm;

#[cfg(all(not(target_arch = "wasm32"), feature = "cli"))]
pub mod runtime;
#[cfg(all(not(target_arch = "wasm32"), feature = "cli"))]
pub mod websocket_native;

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn main() -> Result<(), wasm_bindgen::JsValue> {
    console_error_panic_hook::set_once();

    // Initialize tracing for browser console
    tracing_wasm::set_as_global_default();

    page::start()
}
