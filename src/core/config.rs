//! Poller configuration and focus-aware interval selection

use std::time::Duration;

use super::{Error, Result};

/// Default WebSocket endpoint for the native client (override with KIGORON_WS)
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:7580/ws";

/// Poll interval while the page has focus
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Delay before reconnecting after an unclean close, while focused
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Path the server accepts WebSocket upgrades on
pub const WS_PATH: &str = "/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Target address, fixed for the poller's lifetime
    pub endpoint: String,
    pub poll_interval: Duration,
    pub reconnect_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WS_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl PollerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Endpoint for a page served from `host` (`host[:port]`).
    pub fn for_page_host(host: &str) -> Self {
        Self::new(format!("ws://{}{}", host, WS_PATH))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Build from a variable lookup (`KIGORON_WS`, `KIGORON_POLL_MS`,
    /// `KIGORON_RECONNECT_MS`). Missing variables fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(lookup("KIGORON_WS").unwrap_or_else(|| DEFAULT_WS_URL.to_string()));
        if let Some(ms) = lookup("KIGORON_POLL_MS") {
            config.poll_interval = parse_millis("KIGORON_POLL_MS", &ms)?;
        }
        if let Some(ms) = lookup("KIGORON_RECONNECT_MS") {
            config.reconnect_interval = parse_millis("KIGORON_RECONNECT_MS", &ms)?;
        }
        Ok(config)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{}={:?}: {}", name, value, e)))?;
    if ms == 0 {
        return Err(Error::config(format!("{} must be non-zero", name)));
    }
    Ok(Duration::from_millis(ms))
}

/// Slow down when the page is not focused: `base` with focus, `2 * base`
/// without. Used for both poll and reconnect scheduling.
pub fn scaled_interval(base: Duration, has_focus: bool) -> Duration {
    if has_focus {
        base
    } else {
        base * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unfocused_doubles_interval() {
        let base = Duration::from_millis(1000);
        assert_eq!(scaled_interval(base, true), Duration::from_millis(1000));
        assert_eq!(scaled_interval(base, false), Duration::from_millis(2000));
        assert_eq!(
            scaled_interval(DEFAULT_POLL_INTERVAL, false),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.endpoint, DEFAULT_WS_URL);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.reconnect_interval, Duration::from_millis(1000));
    }

    #[test]
    fn page_host_endpoint() {
        let config = PollerConfig::for_page_host("example.org:7580");
        assert_eq!(config.endpoint, "ws://example.org:7580/ws");
    }

    #[test]
    fn lookup_overrides() {
        let config = PollerConfig::from_lookup(lookup(&[
            ("KIGORON_WS", "ws://10.0.0.1:9000/ws"),
            ("KIGORON_POLL_MS", "250"),
            ("KIGORON_RECONNECT_MS", " 5000 "),
        ]))
        .unwrap();

        assert_eq!(config.endpoint, "ws://10.0.0.1:9000/ws");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.reconnect_interval, Duration::from_millis(5000));
    }

    #[test]
    fn lookup_rejects_bad_numbers() {
        let bad = PollerConfig::from_lookup(lookup(&[("KIGORON_POLL_MS", "fast")]));
        assert!(matches!(bad, Err(Error::Config { .. })));

        let zero = PollerConfig::from_lookup(lookup(&[("KIGORON_RECONNECT_MS", "0")]));
        assert!(matches!(zero, Err(Error::Config { .. })));
    }
}
