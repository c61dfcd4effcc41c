//! Token acquisition: silent reuse and refresh, interactive sign-in,
//! password grant and sign-out over a shared token cache.

use crate::auth::interactive::InteractivePrompt;
use crate::auth::oauth::{TokenEndpoint, TokenResponse};
use crate::auth::token_cache::{saturating_seconds, CacheKey, CachedToken, TokenCache};
use crate::error::{AuthError, CacheError};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Account name used when the provider response carries no readable identity.
const UNKNOWN_ACCOUNT: &str = "unknown";

/// How hard to try before giving up on a silent acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBehavior {
    /// Cache and refresh token only; fail with `InteractionRequired` otherwise.
    Never,
    /// Silent first, then prompt if the provider needs interaction.
    Auto,
    /// Always prompt, ignoring the cache.
    Always,
}

/// How a stored token was obtained.
enum Grant {
    /// Explicit sign-in. Other accounts for the resource are dropped.
    SignIn,
    /// Silent refresh with the refresh token that was redeemed.
    Refresh(String),
}

/// An access token handed to callers.
#[derive(Clone)]
pub struct Token {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub scopes: BTreeSet<String>,
    pub account: String,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl From<&CachedToken> for Token {
    fn from(cached: &CachedToken) -> Self {
        Self {
            access_token: cached.access_token.clone(),
            expires_at: cached.expires_at,
            scopes: cached.scopes.clone(),
            account: cached.account.clone(),
        }
    }
}

/// Acquires tokens for one resource and client id.
pub struct TokenAcquirer {
    endpoint: Arc<dyn TokenEndpoint>,
    prompt: Arc<dyn InteractivePrompt>,
    resource: String,
    client_id: String,
    refresh_before_expiry: Duration,
    /// Held across provider round-trips so acquisitions never overlap.
    cache: Mutex<TokenCache>,
}

impl TokenAcquirer {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        prompt: Arc<dyn InteractivePrompt>,
        cache: TokenCache,
        resource: impl Into<String>,
        client_id: impl Into<String>,
        refresh_before_expiry_seconds: u64,
    ) -> Self {
        Self {
            endpoint,
            prompt,
            resource: resource.into(),
            client_id: client_id.into(),
            refresh_before_expiry: saturating_seconds(refresh_before_expiry_seconds),
            cache: Mutex::new(cache),
        }
    }

    /// Acquire a token; `interactive` forces the sign-in prompt, otherwise
    /// only the cache and refresh token are used.
    pub async fn acquire_token(&self, interactive: bool) -> Result<Token, AuthError> {
        let behavior = if interactive {
            PromptBehavior::Always
        } else {
            PromptBehavior::Never
        };
        self.acquire_token_with(behavior).await
    }

    /// Acquire a token with explicit prompt behavior.
    pub async fn acquire_token_with(&self, behavior: PromptBehavior) -> Result<Token, AuthError> {
        let mut cache = self.cache.lock().await;

        if behavior != PromptBehavior::Always {
            match self.acquire_silent(&mut cache).await {
                Err(AuthError::InteractionRequired) if behavior == PromptBehavior::Auto => {
                    debug!("Silent acquisition needs interaction, prompting");
                }
                result => return result,
            }
        }

        let response = self
            .prompt
            .acquire_interactive(behavior == PromptBehavior::Always)
            .await?;
        Ok(self.store(&mut cache, &response, None, Grant::SignIn))
    }

    /// Exchange a username and password directly for a token.
    pub async fn acquire_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Token, AuthError> {
        let mut cache = self.cache.lock().await;
        let response = self.endpoint.password(username, password).await?;
        Ok(self.store(&mut cache, &response, Some(username), Grant::SignIn))
    }

    /// Clear the cache and end the browser session.
    ///
    /// A failure to reach the browser is logged; the local cache is cleared either way.
    pub async fn sign_out(&self) -> Result<(), CacheError> {
        let mut cache = self.cache.lock().await;
        cache.clear()?;
        info!("Token cache cleared");

        if let Err(e) = self.prompt.end_session().await {
            warn!("Could not end browser session: {}", e);
        }
        Ok(())
    }

    /// The cached token for this resource, if any, without contacting the provider.
    pub async fn cached_token(&self) -> Option<Token> {
        let cache = self.cache.lock().await;
        cache
            .find(&self.resource, &self.client_id)
            .map(|(_, cached)| Token::from(cached))
    }

    async fn acquire_silent(&self, cache: &mut TokenCache) -> Result<Token, AuthError> {
        let Some((key, cached)) = cache
            .find(&self.resource, &self.client_id)
            .map(|(k, t)| (k.clone(), t.clone()))
        else {
            debug!("No cached token for {}", self.resource);
            return Err(AuthError::InteractionRequired);
        };

        if cached.is_fresh(Utc::now(), self.refresh_before_expiry) {
            debug!("Using cached token for {}", key.account);
            return Ok(Token::from(&cached));
        }

        let Some(refresh_token) = cached.refresh_token.clone() else {
            forget(cache, &key);
            return Err(AuthError::InteractionRequired);
        };

        info!("Cached token expired, refreshing");
        match self
            .endpoint
            .refresh(&refresh_token)
            .await
            .map_err(AuthError::for_refresh)
        {
            Ok(response) => Ok(self.store(
                cache,
                &response,
                Some(key.account.as_str()),
                Grant::Refresh(refresh_token),
            )),
            Err(AuthError::InteractionRequired) => {
                forget(cache, &key);
                Err(AuthError::InteractionRequired)
            }
            Err(e) => Err(e),
        }
    }

    fn store(
        &self,
        cache: &mut TokenCache,
        response: &TokenResponse,
        fallback_account: Option<&str>,
        grant: Grant,
    ) -> Token {
        let account = response
            .account()
            .or_else(|| fallback_account.map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string());

        let mut cached = CachedToken::from_response(response, account.clone(), Utc::now());
        let key = CacheKey {
            resource: self.resource.clone(),
            client_id: self.client_id.clone(),
            account,
        };

        let (token, persisted) = match grant {
            Grant::SignIn => {
                let token = Token::from(&cached);
                (token, cache.insert_exclusive(key, cached))
            }
            Grant::Refresh(previous) => {
                if cached.refresh_token.is_none() {
                    cached.refresh_token = Some(previous);
                }
                let token = Token::from(&cached);
                (token, cache.insert(key, cached))
            }
        };
        if let Err(e) = persisted {
            warn!("Failed to persist token cache: {}", e);
        }

        info!(
            "Token cached for {}, expires at {}",
            token.account, token.expires_at
        );
        token
    }
}

fn forget(cache: &mut TokenCache, key: &CacheKey) {
    if let Err(e) = cache.remove(key) {
        warn!("Failed to update token cache: {}", e);
    }
}

/// Calculate the remaining time until token expiry.
pub fn time_until_expiry(expiry: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    if expiry > now {
        Some(expiry - now)
    } else {
        None
    }
}

/// Format duration as human-readable string (e.g., "45 min", "1 hour").
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes();

    if total_minutes < 1 {
        "< 1 min".to_string()
    } else if total_minutes < 60 {
        format!("{} min", total_minutes)
    } else {
        let hours = total_minutes / 60;
        let mins = total_minutes % 60;
        if mins == 0 {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::oauth::tests::fake_jwt;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const RESOURCE: &str = "https://contoso.onmicrosoft.com/TodoListService";

    pub(crate) fn response(account: &str, expires_in: u64, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: fake_jwt(json!({ "upn": account, "scp": "user_impersonation" })),
            token_type: "Bearer".into(),
            expires_in,
            refresh_token: refresh.map(str::to_string),
            id_token: None,
            scope: "user_impersonation".into(),
        }
    }

    /// Token endpoint that counts round-trips.
    #[derive(Default)]
    pub(crate) struct FakeEndpoint {
        pub refreshes: AtomicUsize,
        pub passwords: AtomicUsize,
        pub refresh_error: Option<AuthError>,
        pub delay_ms: u64,
    }

    #[async_trait]
    impl TokenEndpoint for FakeEndpoint {
        async fn exchange_code(&self, _: &str, _: &str) -> Result<TokenResponse, AuthError> {
            unreachable!("the fake prompt never exchanges codes")
        }

        async fn refresh(&self, _: &str) -> Result<TokenResponse, AuthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            match &self.refresh_error {
                Some(e) => Err(e.clone()),
                None => Ok(response("alice@contoso.com", 3600, None)),
            }
        }

        async fn password(&self, username: &str, password: &str) -> Result<TokenResponse, AuthError> {
            self.passwords.fetch_add(1, Ordering::SeqCst);
            if password == "hunter2" {
                Ok(response(username, 3600, Some("rt-password")))
            } else {
                Err(AuthError::Provider {
                    code: "invalid_grant".into(),
                    message: "bad password".into(),
                })
            }
        }
    }

    /// Prompt that counts sign-ins and session ends.
    #[derive(Default)]
    pub(crate) struct FakePrompt {
        pub prompts: AtomicUsize,
        pub forced: AtomicUsize,
        pub session_ends: AtomicUsize,
        pub deny: bool,
        /// Account the user signs in as; alice when unset.
        pub account: Option<&'static str>,
    }

    #[async_trait]
    impl InteractivePrompt for FakePrompt {
        async fn acquire_interactive(&self, force_prompt: bool) -> Result<TokenResponse, AuthError> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            if force_prompt {
                self.forced.fetch_add(1, Ordering::SeqCst);
            }
            if self.deny {
                return Err(AuthError::AccessDenied);
            }
            let account = self.account.unwrap_or("alice@contoso.com");
            Ok(response(account, 3600, Some("rt-interactive")))
        }

        async fn end_session(&self) -> Result<(), AuthError> {
            self.session_ends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn acquirer(
        endpoint: Arc<FakeEndpoint>,
        prompt: Arc<FakePrompt>,
        cache: TokenCache,
    ) -> TokenAcquirer {
        TokenAcquirer::new(endpoint, prompt, cache, RESOURCE, "client", 300)
    }

    fn cache_with(expires_in_minutes: i64, refresh: Option<&str>) -> TokenCache {
        let mut cache = TokenCache::in_memory();
        cache
            .insert(
                CacheKey {
                    resource: RESOURCE.into(),
                    client_id: "client".into(),
                    account: "alice@contoso.com".into(),
                },
                CachedToken {
                    access_token: "cached-access".into(),
                    refresh_token: refresh.map(str::to_string),
                    expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
                    scopes: BTreeSet::new(),
                    account: "alice@contoso.com".into(),
                },
            )
            .unwrap();
        cache
    }

    #[tokio::test]
    async fn test_silent_without_cache_requires_interaction() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt.clone(), TokenCache::in_memory());

        let err = acquirer.acquire_token(false).await.unwrap_err();
        assert_eq!(err, AuthError::InteractionRequired);
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 0);
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_acquisition_then_cache_reuse() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt.clone(), TokenCache::in_memory());

        let first = acquirer.acquire_token_with(PromptBehavior::Auto).await.unwrap();
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(prompt.forced.load(Ordering::SeqCst), 0);
        assert_eq!(first.account, "alice@contoso.com");

        let second = acquirer.acquire_token(false).await.unwrap();
        assert_eq!(second.access_token, first.access_token);
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forced_prompt_bypasses_cache() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt.clone(), cache_with(60, Some("rt")));

        let token = acquirer.acquire_token(true).await.unwrap();
        assert_ne!(token.access_token, "cached-access");
        assert_eq!(prompt.forced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt.clone(), cache_with(1, Some("rt")));

        let token = acquirer.acquire_token(false).await.unwrap();
        assert_ne!(token.access_token, "cached-access");
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);

        acquirer.acquire_token(false).await.unwrap();
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt.clone(), cache_with(1, Some("rt-old")));

        acquirer.acquire_token(false).await.unwrap();

        let cache = acquirer.cache.lock().await;
        let (_, cached) = cache.find(RESOURCE, "client").unwrap();
        assert_eq!(cached.refresh_token.as_deref(), Some("rt-old"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let endpoint = Arc::new(FakeEndpoint {
            delay_ms: 50,
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = Arc::new(acquirer(endpoint.clone(), prompt, cache_with(1, Some("rt"))));

        let a = tokio::spawn({
            let acquirer = Arc::clone(&acquirer);
            async move { acquirer.acquire_token(false).await }
        });
        let b = tokio::spawn({
            let acquirer = Arc::clone(&acquirer);
            async move { acquirer.acquire_token(false).await }
        });

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a.access_token, b.access_token);
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_refresh_requires_interaction() {
        let endpoint = Arc::new(FakeEndpoint {
            refresh_error: Some(AuthError::InteractionRequired),
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt.clone(), cache_with(1, Some("rt")));

        let err = acquirer.acquire_token(false).await.unwrap_err();
        assert_eq!(err, AuthError::InteractionRequired);
        assert!(acquirer.cached_token().await.is_none());
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_refresh_token_forgets_slot() {
        let endpoint = Arc::new(FakeEndpoint {
            refresh_error: Some(AuthError::Provider {
                code: "invalid_grant".into(),
                message: "AADSTS70008: The refresh token has expired.".into(),
            }),
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint, prompt.clone(), cache_with(1, Some("rt")));

        let err = acquirer.acquire_token(false).await.unwrap_err();
        assert_eq!(err, AuthError::InteractionRequired);
        assert!(acquirer.cached_token().await.is_none());
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_error_surfaces_unchanged() {
        let provider_error = AuthError::Provider {
            code: "temporarily_unavailable".into(),
            message: "AADSTS90033: try again".into(),
        };
        let endpoint = Arc::new(FakeEndpoint {
            refresh_error: Some(provider_error.clone()),
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint, prompt.clone(), cache_with(1, Some("rt")));

        let err = acquirer.acquire_token_with(PromptBehavior::Auto).await.unwrap_err();
        assert_eq!(err, provider_error);
        assert_eq!(prompt.prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_access_denied_leaves_cache_empty() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt {
            deny: true,
            ..Default::default()
        });
        let acquirer = acquirer(endpoint, prompt, TokenCache::in_memory());

        let err = acquirer.acquire_token(true).await.unwrap_err();
        assert_eq!(err, AuthError::AccessDenied);
        assert!(acquirer.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn test_password_grant_is_cached() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint.clone(), prompt, TokenCache::in_memory());

        let token = acquirer
            .acquire_with_password("bob@contoso.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(token.account, "bob@contoso.com");

        let again = acquirer.acquire_token(false).await.unwrap();
        assert_eq!(again.access_token, token.access_token);
        assert_eq!(endpoint.passwords.load(Ordering::SeqCst), 1);

        let err = acquirer
            .acquire_with_password("bob@contoso.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_silent_uses_latest_sign_in() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt {
            account: Some("bob@contoso.com"),
            ..Default::default()
        });
        let acquirer = acquirer(endpoint, prompt, TokenCache::in_memory());

        acquirer
            .acquire_with_password("alice@contoso.com", "hunter2")
            .await
            .unwrap();
        let bob = acquirer.acquire_token(true).await.unwrap();
        assert_eq!(bob.account, "bob@contoso.com");

        let silent = acquirer.acquire_token(false).await.unwrap();
        assert_eq!(silent.account, "bob@contoso.com");
        assert_eq!(silent.access_token, bob.access_token);

        let status = acquirer.cached_token().await.unwrap();
        assert_eq!(status.account, "bob@contoso.com");
    }

    #[test]
    fn test_absurd_refresh_threshold_does_not_overflow() {
        let acquirer = TokenAcquirer::new(
            Arc::new(FakeEndpoint::default()),
            Arc::new(FakePrompt::default()),
            TokenCache::in_memory(),
            RESOURCE,
            "client",
            u64::MAX,
        );
        assert_eq!(acquirer.refresh_before_expiry, Duration::MAX);
    }

    #[tokio::test]
    async fn test_sign_out_forces_reacquisition() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let acquirer = acquirer(endpoint, prompt.clone(), cache_with(60, Some("rt")));

        assert!(acquirer.acquire_token(false).await.is_ok());

        acquirer.sign_out().await.unwrap();
        assert_eq!(prompt.session_ends.load(Ordering::SeqCst), 1);

        let err = acquirer.acquire_token(false).await.unwrap_err();
        assert_eq!(err, AuthError::InteractionRequired);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(30)), "< 1 min");
        assert_eq!(format_duration(Duration::minutes(5)), "5 min");
        assert_eq!(format_duration(Duration::hours(1)), "1 hour");
        assert_eq!(format_duration(Duration::hours(2)), "2 hours");
        assert_eq!(format_duration(Duration::minutes(90)), "1h 30m");
    }

    #[test]
    fn test_time_until_expiry() {
        let now = Utc::now();
        let remaining = time_until_expiry(now + Duration::hours(1), now).unwrap();
        assert_eq!(remaining.num_minutes(), 60);
        assert!(time_until_expiry(now - Duration::hours(1), now).is_none());
    }
}
