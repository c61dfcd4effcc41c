//! OAuth2 client for Azure AD: authorization code with PKCE, refresh token
//! and resource-owner password grants against the v1 token endpoint.

use crate::config::Config;
use crate::error::AuthError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;
use uuid::Uuid;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// PKCE code verifier and challenge pair.
#[derive(Debug)]
pub struct PkceChallenge {
    /// The code verifier (stored locally, sent in token exchange).
    pub verifier: String,
    /// The code challenge (SHA256 hash of verifier, sent in auth request).
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair.
    pub fn new() -> Self {
        let verifier = random_urlsafe(32);

        // challenge = BASE64URL(SHA256(verifier))
        let hash = Sha256::digest(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hash);

        Self {
            verifier,
            challenge,
        }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The grants the token acquirer needs from the identity provider.
///
/// Each call is one network round-trip to the token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeem an authorization code.
    async fn exchange_code(&self, code: &str, pkce_verifier: &str)
        -> Result<TokenResponse, AuthError>;

    /// Redeem a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;

    /// Resource-owner password grant.
    async fn password(&self, username: &str, password: &str)
        -> Result<TokenResponse, AuthError>;
}

/// OAuth2 client for Azure AD authentication.
pub struct OAuth2Client {
    client_id: String,
    resource: String,
    redirect_uri: String,
    auth_endpoint: String,
    token_endpoint: String,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    /// Create a new OAuth2 client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: config.oauth.client_id.clone(),
            resource: config.oauth.resource_id.clone(),
            redirect_uri: config.oauth.redirect_uri.clone(),
            auth_endpoint: config.auth_url(),
            token_endpoint: config.token_url(),
            http_client,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Generate the authorization URL for browser-based sign-in.
    ///
    /// Returns the URL and a CSRF state token that must be verified in the callback.
    /// `force_prompt` asks the provider to show the sign-in page even when a
    /// browser session exists.
    pub fn generate_auth_url(&self, pkce: &PkceChallenge, force_prompt: bool) -> Result<(Url, String)> {
        let state = random_urlsafe(16);

        let mut url = Url::parse(&self.auth_endpoint)
            .with_context(|| format!("Invalid auth endpoint '{}'", self.auth_endpoint))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_mode", "query")
                .append_pair("resource", &self.resource)
                .append_pair("state", &state)
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            if force_prompt {
                query.append_pair("prompt", "login");
            }
        }

        Ok((url, state))
    }

    /// POST a grant to the token endpoint and decode the result.
    async fn request_token(
        &self,
        grant: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        let request_id = Uuid::new_v4().to_string();
        debug!(grant, request_id = %request_id, "Requesting token");

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant),
            ("client_id", self.client_id.as_str()),
            ("resource", self.resource.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .header("client-request-id", &request_id)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ProviderErrorBody>(&body) {
                Ok(provider) => {
                    error!(
                        grant,
                        code = %provider.error,
                        "Token request rejected: HTTP {}",
                        status
                    );
                    AuthError::from_provider(&provider.error, &provider.error_description)
                }
                Err(_) => {
                    // Log error details for debugging (doesn't expose to user)
                    error!(grant, "Token request failed: HTTP {} - {}", status, body);
                    AuthError::Transport(format!("HTTP {}", status.as_u16()))
                }
            });
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        info!(grant, "Token acquired, expires in {} seconds", token_response.expires_in);
        Ok(token_response)
    }
}

#[async_trait]
impl TokenEndpoint for OAuth2Client {
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.request_token(
            "authorization_code",
            &[
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", pkce_verifier),
            ],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.request_token("refresh_token", &[("refresh_token", refresh_token)])
            .await
    }

    async fn password(&self, username: &str, password: &str) -> Result<TokenResponse, AuthError> {
        self.request_token(
            "password",
            &[
                ("username", username),
                ("password", password),
                ("scope", "openid"),
            ],
        )
        .await
    }
}

/// Token response from Azure AD.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    /// The v1 endpoint sends this as a string.
    #[serde(deserialize_with = "de_seconds")]
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: String,
}

impl TokenResponse {
    /// Scopes granted with the token.
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_string).collect()
    }

    /// Displayable account identifier for cache keying.
    ///
    /// Read from the id token when present, otherwise from the access token.
    /// Neither is verified here; the service validates what it receives.
    pub fn account(&self) -> Option<String> {
        self.id_token
            .as_deref()
            .and_then(account_from_jwt)
            .or_else(|| account_from_jwt(&self.access_token))
    }
}

fn de_seconds<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Pull the account name out of an unverified JWT payload.
fn account_from_jwt(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: HashMap<String, serde_json::Value> = serde_json::from_slice(&bytes).ok()?;

    ["upn", "unique_name", "preferred_username", "oid", "sub"]
        .iter()
        .find_map(|name| claims.get(*name)?.as_str().map(str::to_string))
}

/// Parse OAuth callback URL to extract code and state.
pub fn parse_callback_url(url_string: &str) -> Result<(String, String), AuthError> {
    let url = Url::parse(url_string).map_err(|_| AuthError::InvalidAuthCode)?;

    let params: HashMap<_, _> = url.query_pairs().collect();

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(AuthError::from_provider(error, &description));
    }

    let code = params
        .get("code")
        .ok_or(AuthError::InvalidAuthCode)?
        .to_string();

    let state = params
        .get("state")
        .ok_or(AuthError::StateValidationFailed)?
        .to_string();

    Ok((code, state))
}
