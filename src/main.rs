use anyhow::{Context, Result};
use clap::Parser;

use vox_engine::config::Args;
use vox_engine::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    log::info!(
        "Resources from {}, user data in {}",
        config.resource_dir.display(),
        config.data_dir.display()
    );

    let startup = config.clone();
    let state = tokio::task::spawn_blocking(move || AppState::from_config(&startup))
        .await
        .context("Startup task failed")?
        .context("Failed to initialize engine")?;

    let cors = server::cors_layer(config.cors_policy_mode, &config.allow_origins);
    let handle = server::start(state, config.addr, cors)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    handle.wait().await.context("Server error")?;
    Ok(())
}
