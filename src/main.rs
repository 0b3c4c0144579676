use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use social_relay_api::{app, config, services::Scheduler, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, platform secrets, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .init();

    let config = config::config().clone();
    tracing::info!("Starting Social Relay API in {:?} mode", config.environment);

    let port = config.server.port;
    let scheduler_enabled = config.scheduler.enabled;
    let state = AppState::from_config(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler_enabled.then(|| tokio::spawn(Scheduler::new(state.clone()).run(shutdown_rx)));

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Social Relay API listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    Ok(())
}
