//! Error types for the poller core.

use thiserror::Error;

/// Errors surfaced by the poller's collaborators.
///
/// None of these are fatal: the poller logs them and carries on.
#[derive(Debug, Error)]
pub enum Error {
    /// Inbound frame was not a valid status record.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport refused to start a connection attempt.
    #[error("connect error: {message}")]
    Connect { message: String },

    /// Transport refused an outbound frame.
    #[error("send error: {message}")]
    Send { message: String },

    /// Host could not register a timer.
    #[error("timer error: {message}")]
    Timer { message: String },

    /// Bad configuration value.
    #[error("config error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect { message: message.into() }
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self::Send { message: message.into() }
    }

    pub fn timer(message: impl Into<String>) -> Self {
        Self::Timer { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
