//! Token acquisition: decide between the cache, a refresh exchange and the
//! interactive authorization-code flow.
//!
//! Responsibilities:
//! - Load the token cache once from an optional [`CacheStore`].
//! - Walk `SilentCheck → RefreshAttempt → InteractiveFlow → Done`.
//! - Fall through on a stale refresh token, fail fast on any other provider error.
//! - Persist the cache once, and only if an exchange changed it.
use oauth2_token_store::RefreshExtractor;
use oauth2_token_types::{
    AccountSelection, AcquisitionCause, Authorizer, CacheStore, OAuthClient, ScopeSet, TokenCache,
    TokenError, TokenReply, error::Result,
};
use std::sync::Arc;

use crate::xoauth2;

enum Stage {
    SilentCheck,
    RefreshAttempt,
    InteractiveFlow,
    Done(TokenReply),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::SilentCheck => "silent_check",
            Self::RefreshAttempt => "refresh_attempt",
            Self::InteractiveFlow => "interactive_flow",
            Self::Done(_) => "done",
        }
    }
}

pub struct TokenAcquisitionEngine {
    client: Arc<dyn OAuthClient>,
    authorizer: Arc<dyn Authorizer>,
    store: Option<Arc<dyn CacheStore>>,
    cache: TokenCache,
    scopes: ScopeSet,
    redirect_uri: String,
    selection: AccountSelection,
}

impl TokenAcquisitionEngine {
    /// Load the cache (empty without a store) and set up the engine.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::CacheCorrupt`] if the stored cache cannot be decoded.
    pub async fn open(
        client: Arc<dyn OAuthClient>,
        authorizer: Arc<dyn Authorizer>,
        store: Option<Arc<dyn CacheStore>>,
        scopes: ScopeSet,
        redirect_uri: impl Into<String>,
    ) -> Result<Self> {
        let cache = match &store {
            Some(store) => store.load().await?,
            None => TokenCache::new(),
        };
        Ok(Self {
            client,
            authorizer,
            store,
            cache,
            scopes,
            redirect_uri: redirect_uri.into(),
            selection: AccountSelection::default(),
        })
    }

    #[must_use]
    pub fn with_selection(mut self, selection: AccountSelection) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Produce an access token for the configured scopes.
    ///
    /// With `interactive == false` the human step is never entered; running
    /// out of cached material then fails with
    /// [`AcquisitionCause::CacheExhaustedNonInteractive`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Acquisition`] on provider, transport or protocol
    /// failures, and [`TokenError::MalformedResponse`] if the pasted redirect
    /// cannot be used.
    pub async fn get_token(&mut self, interactive: bool) -> Result<String> {
        let mut stage = Stage::SilentCheck;
        loop {
            tracing::debug!(stage = stage.name(), "token acquisition");
            stage = match stage {
                Stage::SilentCheck => {
                    match self.client.silent_check(&self.cache, &self.scopes).await? {
                        Some(reply) if reply.access_token.is_some() => Stage::Done(reply),
                        _ => Stage::RefreshAttempt,
                    }
                }
                Stage::RefreshAttempt => self.attempt_refresh().await?,
                Stage::InteractiveFlow if interactive => Stage::Done(self.run_interactive().await?),
                Stage::InteractiveFlow => {
                    return Err(TokenError::Acquisition {
                        cause: AcquisitionCause::CacheExhaustedNonInteractive,
                        description: "no usable cached token or refresh token, and not interactive"
                            .into(),
                    });
                }
                Stage::Done(reply) => return into_access_token(reply),
            };
        }
    }

    async fn attempt_refresh(&mut self) -> Result<Stage> {
        let Some(credential) = RefreshExtractor::select(&self.cache, self.selection) else {
            tracing::debug!("no refresh token cached");
            return Ok(Stage::InteractiveFlow);
        };
        let reply = self
            .client
            .refresh_exchange(
                &mut self.cache,
                credential.secret(),
                credential.account_hint.as_deref(),
                &self.scopes,
            )
            .await?;
        match &reply.error {
            None => {
                tracing::info!("access token refreshed");
                Ok(Stage::Done(reply))
            }
            Some(err) if err.is_recoverable() => {
                tracing::warn!(
                    error = %err.code,
                    suberror = ?err.suberror,
                    "cached refresh token rejected, authorization required"
                );
                Ok(Stage::InteractiveFlow)
            }
            Some(err) => Err(TokenError::provider(err.message())),
        }
    }

    async fn run_interactive(&mut self) -> Result<TokenReply> {
        let flow = self
            .client
            .initiate_auth_code_flow(&self.scopes, &self.redirect_uri)?;
        let response = self.authorizer.authorize(&flow.auth_uri).await?;
        let reply = self
            .client
            .complete_auth_code_flow(&mut self.cache, flow, &response, &self.scopes)
            .await?;
        if let Some(err) = &reply.error {
            return Err(TokenError::provider(err.message()));
        }
        tracing::info!("authorization completed");
        Ok(reply)
    }

    /// Username of the first cached account.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NoAccount`] if the cache holds no account yet;
    /// call [`Self::get_token`] first.
    pub fn identity(&self) -> Result<String> {
        match self.selection {
            AccountSelection::FirstFound => self
                .cache
                .accounts()
                .next()
                .map(|a| a.username.clone())
                .ok_or(TokenError::NoAccount),
        }
    }

    /// Non-interactive token plus identity, formatted for XOAUTH2.
    ///
    /// # Errors
    ///
    /// Propagates failures of [`Self::get_token`] and [`Self::identity`].
    pub async fn auth_string(&mut self) -> Result<String> {
        let token = self.get_token(false).await?;
        let username = self.identity()?;
        Ok(xoauth2::auth_string(&username, &token))
    }

    /// Write the cache back if it changed. Returns whether a write happened.
    ///
    /// Without a store (no-cache mode) this never writes.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Storage`] if the store fails to write.
    pub async fn persist(&mut self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        if !self.cache.has_state_changed() {
            return Ok(false);
        }
        store.save(&self.cache).await?;
        self.cache.mark_saved();
        Ok(true)
    }
}

fn into_access_token(reply: TokenReply) -> Result<String> {
    match reply.access_token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(TokenError::Acquisition {
            cause: AcquisitionCause::MalformedProviderReply,
            description: "no access token in reply".into(),
        }),
    }
}
