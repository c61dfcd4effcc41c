//! HTTP client for the to-do list service.

use std::time::Duration as StdDuration;

use reqwest::{Client, Response};
use tracing::{debug, error, info};

use crate::error::TransportError;
use crate::models::{NewTodoItem, TodoItemView};

/// Path of the to-do list API on the service.
const TODO_LIST_PATH: &str = "/api/todolist";

/// HTTP request timeout.
const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// To-do list service client. Every call carries the caller's bearer token.
pub struct TodoListClient {
    http_client: Client,
    endpoint: String,
}

impl TodoListClient {
    /// Create a client for the service at `base_address`.
    pub fn new(base_address: &str) -> Result<Self, TransportError> {
        let http_client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()
            .map_err(TransportError::Network)?;

        Ok(Self {
            http_client,
            endpoint: format!("{}{}", base_address.trim_end_matches('/'), TODO_LIST_PATH),
        })
    }

    /// Fetch the caller's items.
    pub async fn list(&self, access_token: &str) -> Result<Vec<TodoItemView>, TransportError> {
        debug!("Fetching to-do list from {}", self.endpoint);

        let response = self
            .http_client
            .get(&self.endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = check_status(response).await?;
        let items: Vec<TodoItemView> = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        info!("Fetched {} to-do item(s)", items.len());
        Ok(items)
    }

    /// Create an item. The title is sent form encoded.
    pub async fn add(&self, access_token: &str, title: &str) -> Result<(), TransportError> {
        let body = NewTodoItem {
            title: title.to_string(),
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .form(&body)
            .send()
            .await?;

        check_status(response).await?;
        info!("To-do item created");
        Ok(())
    }
}

/// Turn a non-2xx response into `TransportError::Status`.
///
/// The service puts its reason string in the body; fall back to the
/// canonical reason phrase when the body is empty.
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let reason = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("Unknown").to_string()
    } else {
        body.trim().to_string()
    };

    error!("To-do list request failed: HTTP {} - {}", status, reason);
    Err(TransportError::Status {
        status: status.as_u16(),
        reason,
    })
}
