//! Async traits shared across all oauth2-token crates.
//!
//! Every cross-crate abstraction is defined here so that higher layers depend
//! only on `oauth2-token-types`, not on each other.

use crate::{AuthCodeFlowState, AuthResponse, ScopeSet, TokenCache, TokenReply, error::Result};
use async_trait::async_trait;

/// Persistent home of a [`TokenCache`].
///
/// One process loads the cache once at startup and saves it at most once at
/// shutdown. No locking is done: concurrent writers race and the last one wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the cache, or an empty one if nothing was stored yet.
    async fn load(&self) -> Result<TokenCache>;
    /// Replace the stored cache with `cache`.
    async fn save(&self, cache: &TokenCache) -> Result<()>;
}

/// Protocol operations against the identity provider.
///
/// Exchanges that succeed record their tokens into the passed cache, which is
/// the only way the cache is ever mutated.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Look up a cached, still-valid access token. Never touches the network.
    ///
    /// `Ok(None)` means nothing usable is cached, which is not an error.
    async fn silent_check(
        &self,
        cache: &TokenCache,
        scopes: &ScopeSet,
    ) -> Result<Option<TokenReply>>;

    /// Redeem a refresh token. Provider rejections come back in `TokenReply::error`.
    async fn refresh_exchange(
        &self,
        cache: &mut TokenCache,
        secret: &str,
        account_hint: Option<&str>,
        scopes: &ScopeSet,
    ) -> Result<TokenReply>;

    /// Build the authorization request. Does not wait for anything.
    fn initiate_auth_code_flow(
        &self,
        scopes: &ScopeSet,
        redirect_uri: &str,
    ) -> Result<AuthCodeFlowState>;

    /// Redeem the authorization response for tokens. Consumes the flow state.
    async fn complete_auth_code_flow(
        &self,
        cache: &mut TokenCache,
        flow: AuthCodeFlowState,
        response: &AuthResponse,
        scopes: &ScopeSet,
    ) -> Result<TokenReply>;
}

/// The single point where the acquisition waits for a human.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Present `auth_uri` and return the parsed redirect response.
    async fn authorize(&self, auth_uri: &str) -> Result<AuthResponse>;
}
