//! HTTP routes for the to-do list service.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use crate::error::ValidationError;
use crate::models::TodoItemView;
use crate::service::claims::TokenValidator;
use crate::service::extract::{Authorized, TodoBody};
use crate::service::store::{self, TodoStore};

/// Application state shared across handlers.
pub struct AppState {
    /// Item storage.
    pub store: Arc<dyn TodoStore>,
    /// Bearer token validator.
    pub validator: TokenValidator,
}

/// Creates the service router.
#[must_use = "returns the configured router"]
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/todolist", get(list_todos).post(create_todo))
        .route("/health", get(health_check))
        .with_state(state)
}

/// `GET /api/todolist`
async fn list_todos(
    Authorized(caller): Authorized,
    State(state): State<Arc<AppState>>,
) -> Json<Vec<TodoItemView>> {
    let items = store::list(state.store.as_ref(), &caller.subject);
    Json(items.iter().map(TodoItemView::from).collect())
}

/// `POST /api/todolist`
async fn create_todo(
    Authorized(caller): Authorized,
    State(state): State<Arc<AppState>>,
    TodoBody(item): TodoBody,
) -> Result<StatusCode, ValidationError> {
    store::create(state.store.as_ref(), &caller.subject, &item.title)?;
    info!("Created to-do item for {}", caller.subject);
    Ok(StatusCode::OK)
}

async fn health_check() -> &'static str {
    "ok"
}
