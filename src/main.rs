//! Standalone CLI status client
//!
//! Run with: cargo run --features cli --bin kigoron-cli [-- --background]
//!
//! Environment: KIGORON_WS, KIGORON_POLL_MS, KIGORON_RECONNECT_MS, RUST_LOG.
//! On unix, SIGUSR1 pauses polling and SIGUSR2 resumes it.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use kigoron_poller::core::PollerConfig;
    use kigoron_poller::runtime;
    use tracing::info;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kigoron_poller=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    // --background: behave like an unfocused page (half poll rate, slower reconnects)
    let focused = !std::env::args().any(|a| a == "--background");
    let config = PollerConfig::from_env()?;

    info!(
        url = %config.endpoint,
        poll_ms = config.poll_interval.as_millis() as u64,
        reconnect_ms = config.reconnect_interval.as_millis() as u64,
        focused,
        "Starting status poller"
    );

    runtime::run(config, focused).await?;
    info!("Stopped");
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
