//! Token cache persisted as a single JSON file.
//!
//! The file is read once when the acquisition starts and rewritten in full
//! when it ends, and only if the cache reports a change. There is no locking:
//! two processes sharing a path race and the last writer wins.

use async_trait::async_trait;
use oauth2_token_types::{CacheStore, TokenCache, TokenError, error::Result};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::io::AsyncWriteExt as _;

/// A [`CacheStore`] backed by a file on disk.
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open_for_write(&self) -> std::io::Result<tokio::fs::File> {
        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        // The cache holds refresh tokens.
        #[cfg(unix)]
        opts.mode(0o600);
        opts.open(&self.path).await
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    /// Reads and decodes the cache file; a missing file yields an empty cache.
    async fn load(&self) -> Result<TokenCache> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => {
                let cache = TokenCache::deserialize(&text, &self.path)?;
                tracing::debug!(path = %self.path.display(), "token cache loaded");
                Ok(cache)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no token cache yet, starting empty");
                Ok(TokenCache::new())
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(TokenError::CacheCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(TokenError::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Writes the whole cache, creating parent directories as needed.
    ///
    /// The file handle is scoped to this call and closed on every exit path.
    async fn save(&self, cache: &TokenCache) -> Result<()> {
        let data = cache.serialize()?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = self.open_for_write().await.map_err(|e| {
            TokenError::Storage(format!("cannot write {}: {e}", self.path.display()))
        })?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        tracing::info!(path = %self.path.display(), "token cache saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use oauth2_token_types::{ScopeSet, TokenResponse};
    use serde_json::json;

    fn populated_cache() -> TokenCache {
        let claims = json!({"oid": "o", "tid": "t", "preferred_username": "alice@example.com"});
        let id_token = format!(
            "e30.{}.",
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let response = TokenResponse {
            access_token: Some("at".into()),
            refresh_token: Some("rt".into()),
            id_token: Some(id_token),
            expires_in: Some(3600),
            ..TokenResponse::default()
        };
        let scopes = ScopeSet::new(["Mail.Read"]).unwrap();
        let mut cache = TokenCache::new();
        cache.record("cid", &scopes, &response, None, 0);
        cache
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCacheStore::new(dir.path().join("cache.json"));
        let cache = store.load().await.unwrap();
        assert!(cache.is_empty());
        assert!(!cache.has_state_changed());
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ this is not json").unwrap();
        let err = FileCacheStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, TokenError::CacheCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_load_non_utf8_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = FileCacheStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, TokenError::CacheCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_save_creates_file_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let store = FileCacheStore::new(&path);
        store.save(&populated_cache()).await.unwrap();
        assert!(path.is_file());

        let back = store.load().await.unwrap();
        assert_eq!(back.accounts().count(), 1);
        assert_eq!(back.refresh_tokens().next().unwrap().secret, "rt");
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "x".repeat(64 * 1024)).unwrap();
        let store = FileCacheStore::new(&path);
        store.save(&TokenCache::new()).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        FileCacheStore::new(&path)
            .save(&populated_cache())
            .await
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }
}
