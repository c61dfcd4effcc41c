//! To-do list service: bearer token gate, in-memory store and HTTP routes.

pub mod claims;
pub mod extract;
pub mod routes;
pub mod store;

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use claims::TokenValidator;
use routes::{create_router, AppState};
use store::InMemoryTodoStore;

/// Build the token validator from configuration, fetching signing keys if a JWKS URL is set.
pub async fn build_validator(config: &Config) -> Result<TokenValidator> {
    let service = &config.service;

    let validator = if !service.jwks_url.is_empty() {
        let jwks = claims::fetch_jwks(&service.jwks_url).await?;
        TokenValidator::with_jwks(jwks, &service.required_scope)
    } else {
        TokenValidator::with_secret(service.hmac_secret.as_bytes(), &service.required_scope)
    };

    Ok(validator
        .with_audience(&service.audience)
        .with_issuer(&service.issuer))
}

/// Runs the to-do list service until the process is stopped.
pub async fn run(config: &Config) -> Result<()> {
    let bind_addr = config.bind_address()?;

    let state = Arc::new(AppState {
        store: Arc::new(InMemoryTodoStore::new()),
        validator: build_validator(config).await?,
    });

    let app = create_router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(bind_addr).await?;
    info!("To-do list service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
