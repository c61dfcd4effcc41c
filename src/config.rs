//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml with environment variable overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub oauth: OAuthConfig,
    pub todo: TodoConfig,
    pub service: ServiceConfig,
    pub token: TokenConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub aad_instance: String,
    pub tenant: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub resource_id: String,
    pub interactive_timeout_seconds: u64,
    pub persist_cache: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TodoConfig {
    pub base_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub required_scope: String,
    #[serde(default)]
    pub jwks_url: String,
    #[serde(default)]
    pub hmac_secret: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub issuer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub refresh_before_expiry_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    /// Load configuration from embedded config.toml with environment variable overrides.
    ///
    /// Validation is left to the binary, since the client and the service
    /// need different sections filled in.
    pub fn load() -> Result<Self> {
        let mut config: Config =
            toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?;

        config.apply_env_overrides();

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut String); 11] = [
            ("TODOLIST_CLIENT_ID", &mut self.oauth.client_id),
            ("TODOLIST_TENANT", &mut self.oauth.tenant),
            ("TODOLIST_REDIRECT_URI", &mut self.oauth.redirect_uri),
            ("TODOLIST_RESOURCE_ID", &mut self.oauth.resource_id),
            ("TODOLIST_BASE_ADDRESS", &mut self.todo.base_address),
            ("TODOLIST_BIND", &mut self.service.bind_address),
            ("TODOLIST_JWKS_URL", &mut self.service.jwks_url),
            ("TODOLIST_HMAC_SECRET", &mut self.service.hmac_secret),
            ("TODOLIST_AUDIENCE", &mut self.service.audience),
            ("TODOLIST_ISSUER", &mut self.service.issuer),
            ("RUST_LOG", &mut self.logging.level),
        ];

        for (name, slot) in overrides {
            if let Ok(value) = env::var(name) {
                *slot = value;
            }
        }
    }

    /// Validate the sections the client needs.
    pub fn validate_client(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() || self.oauth.client_id == "YOUR_AZURE_AD_CLIENT_ID" {
            anyhow::bail!(
                "Azure AD client_id not configured. Set TODOLIST_CLIENT_ID environment variable \
                 or update config.toml"
            );
        }

        if self.oauth.tenant.is_empty() || self.oauth.tenant == "YOUR_TENANT" {
            anyhow::bail!(
                "Azure AD tenant not configured. Set TODOLIST_TENANT environment variable \
                 or update config.toml"
            );
        }

        if self.oauth.resource_id.is_empty()
            || self.oauth.resource_id == "YOUR_TODO_LIST_RESOURCE_ID"
        {
            anyhow::bail!(
                "To-do list resource id not configured. Set TODOLIST_RESOURCE_ID environment \
                 variable or update config.toml"
            );
        }

        url::Url::parse(&self.oauth.redirect_uri).context("Invalid redirect URI")?;
        url::Url::parse(&self.todo.base_address).context("Invalid to-do list base address")?;

        Ok(())
    }

    /// Validate the sections the service needs.
    pub fn validate_service(&self) -> Result<()> {
        self.bind_address()?;

        if self.service.required_scope.is_empty() {
            anyhow::bail!("service.required_scope must not be empty");
        }

        if self.service.jwks_url.is_empty() && self.service.hmac_secret.is_empty() {
            anyhow::bail!(
                "No token signing keys configured. Set TODOLIST_JWKS_URL or \
                 TODOLIST_HMAC_SECRET"
            );
        }

        Ok(())
    }

    /// Parsed service bind address.
    pub fn bind_address(&self) -> Result<SocketAddr> {
        self.service
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", self.service.bind_address))
    }

    /// Sign-in authority for the configured tenant.
    pub fn authority(&self) -> String {
        let authority = self.oauth.aad_instance.replace("{tenant}", &self.oauth.tenant);
        authority.trim_end_matches('/').to_string()
    }

    /// Get the authorization URL for Azure AD.
    pub fn auth_url(&self) -> String {
        format!("{}/oauth2/authorize", self.authority())
    }

    /// Get the token URL for Azure AD.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.authority())
    }

    /// Get the end-session URL for Azure AD.
    pub fn logout_url(&self) -> String {
        format!("{}/oauth2/logout", self.authority())
    }
}
