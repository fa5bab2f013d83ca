//! BlazeKV server entry point.
//!
//! Loads configuration from the environment, starts the server, and shuts
//! down gracefully on SIGINT or SIGTERM.

use blazekv::{Config, Server};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = Config::from_env();
    println!(
        "BlazeKV v{} - in-memory key/value server\n\
         ────────────────────────────────────────\n\
         Binding {} (max {} connections, reaper every {:?})\n",
        blazekv::VERSION,
        config.bind_address(),
        config.max_connections,
        config.expiration_check_interval,
    );

    let server = Server::new(config);
    server.run(shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Completes when the process receives SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
