//! Courier Game Server - authoritative round server entry point
//!
//! Boots the shared services and the round task, then waits for a shutdown
//! signal. The transport layer (WebSocket/HTTP) lives outside this binary;
//! it talks to the round through the channels on [`RoundHandle`].
//!
//! [`RoundHandle`]: courier_game_server::round::RoundHandle

use courier_game_server::app::AppState;
use courier_game_server::config::Config;
use courier_game_server::round::ControlMsg;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Courier Game Server");

    // Wire shared state and spawn the authoritative round loop
    let (state, round) = AppState::new(config);
    let round_task = tokio::spawn(round.run());

    shutdown_signal().await;

    // Ask the round task to stop and wait for it to drain.
    let _ = state.round.control_tx.send(ControlMsg::Shutdown).await;
    let _ = round_task.await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
