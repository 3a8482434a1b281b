//! Tierdesk engine binary: load configuration, wire the engine, run the
//! background loops until interrupted.

use anyhow::Result;
use tierdesk_engine::{EngineConfig, SupportEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig::from_env();
    info!(?config, "starting tierdesk engine");

    let engine = SupportEngine::builder(config).build().await?;
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    engine.shutdown().await;
    Ok(())
}
