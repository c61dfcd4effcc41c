//! Axum extractors: the bearer-token gate and the to-do request body.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequest, FromRequestParts, Request},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
        request::Parts,
        StatusCode,
    },
    response::{IntoResponse, Response},
    Form, Json,
};
use tracing::warn;

use crate::error::{AuthorizationError, ValidationError};
use crate::models::NewTodoItem;
use crate::service::claims::Caller;
use crate::service::routes::AppState;

/// Extractor for an authorized caller.
///
/// Rejects with 401 and a reason string when the bearer token is missing,
/// invalid, lacks the required scope or has no subject.
#[derive(Debug, Clone)]
pub struct Authorized(pub Caller);

impl IntoResponse for AuthorizationError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Bearer")],
            self.to_string(),
        )
            .into_response()
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthorizationError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthorizationError::MissingToken)?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(AuthorizationError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthorizationError::MissingToken);
    }
    Ok(token.trim())
}

impl<S> FromRequestParts<S> for Authorized
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthorizationError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let caller = bearer_token(parts)
            .and_then(|token| app_state.validator.validate(token))
            .inspect_err(|e| warn!(path = %parts.uri.path(), "Rejected request: {}", e))?;

        Ok(Self(caller))
    }
}

/// A new to-do item posted as JSON or as a URL-encoded form.
#[derive(Debug, Clone)]
pub struct TodoBody(pub NewTodoItem);

impl<S> FromRequest<S> for TodoBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(item) = Json::<NewTodoItem>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(item))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(item) = Form::<NewTodoItem>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(item))
        } else {
            Err((
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Expected a JSON or form-encoded body",
            )
                .into_response())
        }
    }
}
