//! To-do list service.
//!
//! Serves `/api/todolist` to callers presenting an Azure AD bearer token.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use todolist::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let config = Config::load()?;
    config
        .validate_service()
        .context("Invalid service configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(false)
        .init();

    info!("Starting {}-service v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    todolist::service::run(&config).await
}
