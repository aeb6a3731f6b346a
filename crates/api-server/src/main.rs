//! API Server Binary Entry Point

use anyhow::Context;
use mood_tracker_api_server::{start_server, ApiState, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mood_tracker_api_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load().context("Failed to load server configuration")?;

    // Model loading failures abort startup
    let pipeline = config.build_pipeline()?;
    let state = ApiState::new(pipeline).with_body_limit(config.body_limit);

    tracing::info!("Starting Mood Tracker API Server");
    start_server(&config.addr, state)
        .await
        .with_context(|| format!("Server on {} failed", config.addr))?;

    Ok(())
}
