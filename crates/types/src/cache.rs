//! In-memory model of the serialized token cache.
//!
//! The blob holds every known account together with its access, refresh and
//! ID tokens. Entries live in sorted maps, so "storage order" is the sorted
//! order of their keys. Any mutation sets the dirty flag; the owner persists
//! the blob only when [`TokenCache::has_state_changed`] says so.

use crate::{ScopeSet, TokenError, TokenResponse, error::Result};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// Version written into every serialized blob.
pub const CACHE_VERSION: u32 = 1;

/// Cached access tokens expiring within this window are not handed out.
pub const EXPIRY_SKEW_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub home_account_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenEntry {
    pub home_account_id: String,
    pub client_id: String,
    pub secret: String,
    /// Lower-cased, space-separated scopes the token was issued for.
    pub target: String,
    pub cached_at: u64,
    pub expires_on: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenEntry {
    pub home_account_id: String,
    pub client_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenEntry {
    pub home_account_id: String,
    pub client_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CacheBlob {
    version: u32,
    #[serde(default)]
    accounts: BTreeMap<String, AccountEntry>,
    #[serde(default)]
    access_tokens: BTreeMap<String, AccessTokenEntry>,
    #[serde(default)]
    refresh_tokens: BTreeMap<String, RefreshTokenEntry>,
    #[serde(default)]
    id_tokens: BTreeMap<String, IdTokenEntry>,
}

/// All cached credential state plus a change-tracking flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCache {
    blob: CacheBlob,
    dirty: bool,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    /// An empty, clean cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blob: CacheBlob {
                version: CACHE_VERSION,
                ..CacheBlob::default()
            },
            dirty: false,
        }
    }

    /// Decode a blob previously produced by [`TokenCache::serialize`].
    ///
    /// `origin` is only used to label errors.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::CacheCorrupt`] for undecodable JSON or an unknown version.
    pub fn deserialize(data: &str, origin: &Path) -> Result<Self> {
        let corrupt = |reason: String| TokenError::CacheCorrupt {
            path: origin.to_path_buf(),
            reason,
        };
        let blob: CacheBlob = serde_json::from_str(data).map_err(|e| corrupt(e.to_string()))?;
        if blob.version != CACHE_VERSION {
            return Err(corrupt(format!(
                "unsupported cache version {} (expected {CACHE_VERSION})",
                blob.version
            )));
        }
        Ok(Self { blob, dirty: false })
    }

    /// # Errors
    ///
    /// Returns [`TokenError::Storage`] if serialization fails.
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.blob).map_err(|e| TokenError::Storage(e.to_string()))
    }

    /// Whether the cache was mutated since it was loaded or last saved.
    #[must_use]
    pub fn has_state_changed(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a successful save.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blob.accounts.is_empty()
            && self.blob.access_tokens.is_empty()
            && self.blob.refresh_tokens.is_empty()
            && self.blob.id_tokens.is_empty()
    }

    /// Accounts in storage order.
    pub fn accounts(&self) -> impl Iterator<Item = &AccountEntry> {
        self.blob.accounts.values()
    }

    /// Refresh tokens in storage order.
    pub fn refresh_tokens(&self) -> impl Iterator<Item = &RefreshTokenEntry> {
        self.blob.refresh_tokens.values()
    }

    /// First access token for `client_id` covering `scopes` that is still
    /// valid at `now` (with [`EXPIRY_SKEW_SECS`] to spare). Any account matches.
    #[must_use]
    pub fn find_access_token(
        &self,
        client_id: &str,
        scopes: &ScopeSet,
        now: u64,
    ) -> Option<&AccessTokenEntry> {
        self.blob.access_tokens.values().find(|at| {
            at.client_id == client_id
                && scopes.is_covered_by(&at.target)
                && at.expires_on > now.saturating_add(EXPIRY_SKEW_SECS)
        })
    }

    /// Record a successful token endpoint response.
    ///
    /// The account is derived from the ID token when present, otherwise
    /// `account_hint` (the account owning the refresh token that was used).
    /// Without either there is no account to file the tokens under and the
    /// response is ignored.
    pub fn record(
        &mut self,
        client_id: &str,
        scopes: &ScopeSet,
        response: &TokenResponse,
        account_hint: Option<&str>,
        now: u64,
    ) {
        let claims = response.id_token.as_deref().and_then(IdTokenClaims::decode);
        let home_account_id = claims
            .as_ref()
            .and_then(IdTokenClaims::home_account_id)
            .or_else(|| account_hint.map(str::to_string));
        let Some(home_account_id) = home_account_id else {
            return;
        };

        if let Some(c) = &claims
            && let Some(username) = c.username()
        {
            let entry = AccountEntry {
                home_account_id: home_account_id.clone(),
                username: username.to_string(),
                tenant_id: c.tid.clone(),
            };
            self.blob
                .accounts
                .insert(home_account_id.to_ascii_lowercase(), entry);
        }

        if let Some(secret) = &response.access_token {
            let target = response
                .scope
                .as_deref()
                .and_then(|s| ScopeSet::new(s.split_whitespace()).ok())
                .map_or_else(|| scopes.target(), |granted| granted.target());
            let key = entry_key(&[&home_account_id, client_id, &target]);
            self.blob.access_tokens.insert(
                key,
                AccessTokenEntry {
                    home_account_id: home_account_id.clone(),
                    client_id: client_id.to_string(),
                    secret: secret.clone(),
                    target,
                    cached_at: now,
                    expires_on: now.saturating_add(response.expires_in.unwrap_or(0)),
                },
            );
        }

        if let Some(secret) = &response.refresh_token {
            self.blob.refresh_tokens.insert(
                entry_key(&[&home_account_id, client_id]),
                RefreshTokenEntry {
                    home_account_id: home_account_id.clone(),
                    client_id: client_id.to_string(),
                    secret: secret.clone(),
                },
            );
        }

        if let Some(secret) = &response.id_token {
            self.blob.id_tokens.insert(
                entry_key(&[&home_account_id, client_id]),
                IdTokenEntry {
                    home_account_id: home_account_id.clone(),
                    client_id: client_id.to_string(),
                    secret: secret.clone(),
                },
            );
        }

        self.dirty = true;
    }
}

fn entry_key(parts: &[&str]) -> String {
    parts.join("-").to_ascii_lowercase()
}

/// The subset of ID token claims used to identify an account.
///
/// The token signature is not verified; the ID token arrives over TLS from the
/// token endpoint and is only used to label the cache entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a JWT.
    #[must_use]
    pub fn decode(jwt: &str) -> Option<Self> {
        let payload = jwt.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// `<oid>.<tid>`, falling back to `sub` when either is missing.
    #[must_use]
    pub fn home_account_id(&self) -> Option<String> {
        match (&self.oid, &self.tid) {
            (Some(oid), Some(tid)) => Some(format!("{oid}.{tid}")),
            _ => self.sub.clone(),
        }
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.preferred_username
            .as_deref()
            .or(self.upn.as_deref())
            .or(self.email.as_deref())
    }
}
