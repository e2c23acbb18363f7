//! Platform-agnostic core module - shared between the browser client and CLI

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod host;
pub mod parser;
pub mod poller;

pub use config::{scaled_interval, PollerConfig};
pub use data::{StatusBoard, StatusMessage};
pub use error::{Error, Result};
pub use events::{ConnectionId, Event, TimerId, TimerKind, Visibility};
pub use host::{Connector, DisplaySink, Host, Transport};
pub use parser::{parse_status, POLL_FRAME};
pub use poller::Poller;
