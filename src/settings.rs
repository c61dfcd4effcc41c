//! Local paths used by the client.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::debug;

/// Token cache file name.
const TOKEN_CACHE_FILE: &str = "token_cache.json";

/// Directory for the client's persistent data.
///
/// Returns the platform cache directory (e.g. `~/.cache/todolist` on Linux),
/// or `~/.todolist` when the platform has none.
pub fn data_directory() -> PathBuf {
    ProjectDirs::from("com", "example", "todolist")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".todolist")
        })
}

/// Path of the persisted token cache.
pub fn token_cache_path() -> PathBuf {
    data_directory().join(TOKEN_CACHE_FILE)
}

/// Create the data directory if it does not exist yet.
pub fn init_data_directory() -> Result<PathBuf> {
    let dir = data_directory();
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Could not create {}", dir.display()))?;
        debug!("Created data directory {}", dir.display());
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cache_path() {
        let path = token_cache_path();
        assert!(path.ends_with(TOKEN_CACHE_FILE));
        assert!(path.to_string_lossy().contains("todolist"));
    }
}
