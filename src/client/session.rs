//! Client-side session: ties token acquisition to the to-do list calls.

use std::sync::Arc;

use tracing::{error, info};

use crate::auth::{Token, TokenAcquirer};
use crate::client::todo_client::TodoListClient;
use crate::error::{AppError, AuthError, ValidationError};
use crate::models::TodoItemView;

/// Result of an explicit sign-in.
#[derive(Debug)]
pub enum SignInOutcome {
    SignedIn(Token),
    /// The user cancelled in the browser; they stay signed out.
    Cancelled,
}

/// Signed-in state of the client plus the operations the UI offers.
pub struct TodoSession {
    acquirer: Arc<TokenAcquirer>,
    client: TodoListClient,
}

impl TodoSession {
    pub fn new(acquirer: Arc<TokenAcquirer>, client: TodoListClient) -> Self {
        Self { acquirer, client }
    }

    /// Try to pick up an existing session without prompting.
    ///
    /// Returns the token if one could be acquired silently. Missing
    /// credentials are expected at startup and are not reported.
    pub async fn start(&self) -> Option<Token> {
        match self.acquirer.acquire_token(false).await {
            Ok(token) => {
                info!("Existing session restored for {}", token.account);
                Some(token)
            }
            Err(AuthError::InteractionRequired) => {
                info!("No existing session to restore");
                None
            }
            Err(e) => {
                error!("Silent sign-in failed: {}", e);
                None
            }
        }
    }

    /// List the signed-in user's items.
    pub async fn list(&self) -> Result<Vec<TodoItemView>, AppError> {
        let token = self.acquirer.acquire_token(false).await?;
        Ok(self.client.list(&token.access_token).await?)
    }

    /// Add an item and return the refreshed list.
    ///
    /// A blank title is rejected before any network call.
    pub async fn add(&self, title: &str) -> Result<Vec<TodoItemView>, AppError> {
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle.into());
        }

        let token = self.acquirer.acquire_token(false).await?;
        self.client.add(&token.access_token, title).await?;
        Ok(self.client.list(&token.access_token).await?)
    }

    /// Interactive sign-in, always showing the provider's sign-in page.
    pub async fn sign_in(&self) -> Result<SignInOutcome, AppError> {
        match self.acquirer.acquire_token(true).await {
            Ok(token) => Ok(SignInOutcome::SignedIn(token)),
            Err(AuthError::AccessDenied) => {
                info!("Sign-in cancelled by the user");
                Ok(SignInOutcome::Cancelled)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sign in with a username and password, without a browser.
    pub async fn sign_in_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Token, AppError> {
        Ok(self.acquirer.acquire_with_password(username, password).await?)
    }

    /// Forget cached tokens and the browser session.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        self.acquirer.sign_out().await?;
        info!("Signed out");
        Ok(())
    }

    /// Cached token, if signed in. Never contacts the provider.
    pub async fn current_token(&self) -> Option<Token> {
        self.acquirer.cached_token().await
    }
}
