//! Interactive sign-in through the system browser.

use crate::auth::callback_server::CallbackServer;
use crate::auth::oauth::{parse_callback_url, OAuth2Client, PkceChallenge, TokenEndpoint, TokenResponse};
use crate::config::Config;
use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

/// The host-specific part of sign-in: showing a consent UI and ending the
/// provider session it leaves behind.
#[async_trait]
pub trait InteractivePrompt: Send + Sync {
    /// Let the user sign in and return the resulting tokens.
    ///
    /// `force_prompt` asks for credentials even if the provider remembers the user.
    async fn acquire_interactive(&self, force_prompt: bool) -> Result<TokenResponse, AuthError>;

    /// Forget provider-side session artifacts (browser cookies).
    async fn end_session(&self) -> Result<(), AuthError>;
}

/// Authorization-code sign-in using the default browser and a loopback redirect.
pub struct BrowserPrompt {
    oauth_client: Arc<OAuth2Client>,
    redirect_uri: String,
    logout_url: String,
    timeout: Duration,
}

impl BrowserPrompt {
    pub fn new(oauth_client: Arc<OAuth2Client>, config: &Config) -> Self {
        Self {
            oauth_client,
            redirect_uri: config.oauth.redirect_uri.clone(),
            logout_url: config.logout_url(),
            timeout: Duration::from_secs(config.oauth.interactive_timeout_seconds),
        }
    }
}

#[async_trait]
impl InteractivePrompt for BrowserPrompt {
    async fn acquire_interactive(&self, force_prompt: bool) -> Result<TokenResponse, AuthError> {
        info!("Starting interactive sign-in");

        let server = CallbackServer::bind(&self.redirect_uri).await?;

        let pkce = PkceChallenge::new();
        let (auth_url, expected_state) = self
            .oauth_client
            .generate_auth_url(&pkce, force_prompt)
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        open::that(auth_url.as_str()).map_err(|e| {
            error!("Failed to open browser: {}", e);
            AuthError::BrowserLaunch(e.to_string())
        })?;

        let callback_url = server.wait(self.timeout).await?;
        let (code, state) = parse_callback_url(&callback_url)?;

        if state != expected_state {
            return Err(AuthError::StateValidationFailed);
        }

        self.oauth_client.exchange_code(&code, &pkce.verifier).await
    }

    async fn end_session(&self) -> Result<(), AuthError> {
        // No post-logout redirect: the callback server is not running now
        let url = Url::parse(&self.logout_url)
            .map_err(|e| AuthError::Transport(format!("invalid logout URL: {}", e)))?;

        info!("Ending browser session");
        open::that(url.as_str()).map_err(|e| AuthError::BrowserLaunch(e.to_string()))
    }
}
