//! In-memory token cache store holding the serialized blob behind a `Mutex`.

use async_trait::async_trait;
use oauth2_token_types::{CacheStore, TokenCache, error::Result};
use std::{
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// An in-memory [`CacheStore`] for testing and ephemeral use.
///
/// The cache goes through the same serialize/deserialize pair as the file
/// store, so a fresh load behaves like a new process reading the file.
pub struct InMemoryCacheStore {
    data: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl InMemoryCacheStore {
    /// Creates a store with nothing saved yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(None),
            saves: AtomicUsize::new(0),
        }
    }

    /// Creates a store pre-seeded with a serialized cache.
    #[must_use]
    pub fn with_contents(serialized: impl Into<String>) -> Self {
        Self {
            data: Mutex::new(Some(serialized.into())),
            saves: AtomicUsize::new(0),
        }
    }

    /// The currently stored blob, if any.
    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.data.lock().unwrap().clone()
    }

    /// How many times [`CacheStore::save`] was called.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn load(&self) -> Result<TokenCache> {
        match self.data.lock().unwrap().as_deref() {
            Some(text) => TokenCache::deserialize(text, Path::new("<memory>")),
            None => Ok(TokenCache::new()),
        }
    }

    async fn save(&self, cache: &TokenCache) -> Result<()> {
        let text = cache.serialize()?;
        *self.data.lock().unwrap() = Some(text);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
