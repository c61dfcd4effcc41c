//! Token cache keyed by (resource, client id, account).
//!
//! Holds tokens in memory and, when a file path is configured, mirrors them
//! to a JSON file so a restarted client can sign in silently.

use crate::auth::oauth::TokenResponse;
use crate::error::CacheError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Identifies one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub resource: String,
    pub client_id: String,
    pub account: String,
}

/// A cached access token and what is needed to renew it.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CachedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub scopes: BTreeSet<String>,
    #[zeroize(skip)]
    pub account: String,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("account", &self.account)
            .finish()
    }
}

impl CachedToken {
    /// Build a cache entry from a provider response received at `now`.
    pub fn from_response(response: &TokenResponse, account: String, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token.clone(),
            refresh_token: response.refresh_token.clone(),
            expires_at: expiry_after(now, response.expires_in),
            scopes: response.scopes().into_iter().collect(),
            account,
        }
    }

    /// True if the token is still usable `skew` ahead of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(skew)
            .is_some_and(|deadline| deadline > now)
    }
}

/// Convert a second count from the provider or config into a `Duration`,
/// saturating instead of wrapping.
pub(crate) fn saturating_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// `now + expires_in`, clamped to the latest representable instant.
fn expiry_after(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    now.checked_add_signed(saturating_seconds(expires_in))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<CacheEntry>,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    key: CacheKey,
    token: CachedToken,
}

/// In-memory token cache with optional file persistence.
#[derive(Default)]
pub struct TokenCache {
    entries: Vec<CacheEntry>,
    path: Option<PathBuf>,
}

impl TokenCache {
    /// Create a memory-only cache.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed cache, loading any entries already on disk.
    ///
    /// An unreadable file is treated as empty so a corrupt cache only costs
    /// one interactive sign-in.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_file(&path) {
            Ok(file) => file.entries,
            Err(e) => {
                warn!("Ignoring token cache at {}: {}", path.display(), e);
                Vec::new()
            }
        };
        debug!("Loaded {} cached token(s)", entries.len());

        Self {
            entries,
            path: Some(path),
        }
    }

    /// Find the cached account for this resource and client.
    ///
    /// Silent acquisition does not know the account up front; the most
    /// recently stored slot wins.
    pub fn find(&self, resource: &str, client_id: &str) -> Option<(&CacheKey, &CachedToken)> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.key.resource == resource && e.key.client_id == client_id)
            .map(|e| (&e.key, &e.token))
    }

    /// Store a token, replacing any previous token for the slot.
    pub fn insert(&mut self, key: CacheKey, token: CachedToken) -> Result<(), CacheError> {
        self.entries.retain(|e| e.key != key);
        self.entries.push(CacheEntry { key, token });
        self.persist()
    }

    /// Store a token and drop every other account cached for the same
    /// resource and client.
    pub fn insert_exclusive(&mut self, key: CacheKey, token: CachedToken) -> Result<(), CacheError> {
        self.entries
            .retain(|e| e.key.resource != key.resource || e.key.client_id != key.client_id);
        self.entries.push(CacheEntry { key, token });
        self.persist()
    }

    /// Drop a single slot.
    pub fn remove(&mut self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.retain(|e| &e.key != key);
        self.persist()
    }

    /// Remove every cached token, including the file copy.
    pub fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        if let Some(path) = &self.path {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::Io(e)),
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = CacheFile {
            entries: self
                .entries
                .iter()
                .map(|e| CacheEntry {
                    key: e.key.clone(),
                    token: e.token.clone(),
                })
                .collect(),
        };
        let json = zeroize::Zeroizing::new(
            serde_json::to_string(&file).map_err(|e| CacheError::WriteFailed(e.to_string()))?,
        );

        write_private(path, json.as_bytes())
    }
}

fn load_file(path: &Path) -> Result<CacheFile, CacheError> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let text = zeroize::Zeroizing::new(text);
            serde_json::from_str(&text).map_err(|e| CacheError::ReadFailed(e.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheFile::default()),
        Err(e) => Err(CacheError::Io(e)),
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    fs::write(path, bytes)?;
    Ok(())
}
