use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod db;
mod error;
mod lifecycle;
mod polling;
mod proof_pipeline;
mod push;
mod server;
mod submission;

use config::RelayerConfig;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relayer=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = RelayerConfig::from_env()?;

    info!("starting relayer");
    info!("listening on {}:{}", config.host, config.port);
    info!(chains = config.chains.len(), "loaded chain configuration");

    let state = Arc::new(AppState::new(config).await?);
    server::run(state).await?;
    Ok(())
}
