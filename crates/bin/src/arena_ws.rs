//! Arena - bare WebSocket listener, no HTTP endpoints.
//!
//! Log verbosity follows `RUST_LOG`; `config.toml` is created on first run.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,server=debug")),
        )
        .with_target(false)
        .init();

    let config = server::Config::load()?;
    info!(
        "Arena WebSocket Server v{} (no /status or /matches, use `arena` for those)",
        env!("CARGO_PKG_VERSION")
    );
    config.log_summary();

    tokio::select! {
        result = server::run(config) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
