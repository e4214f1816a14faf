//! Client identity, scopes, and the transient values exchanged with the provider.

use crate::{TokenError, error::Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Scopes the identity provider adds to every token request on its own.
pub const RESERVED_SCOPES: &[&str] = &["openid", "profile", "offline_access"];

/// Current UNIX time in seconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// The OAuth2 application on whose behalf tokens are requested.
#[derive(Debug)]
pub struct ClientIdentity {
    client_id: String,
    client_secret: Option<SecretString>,
}

impl ClientIdentity {
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if `client_id` is empty.
    pub fn new(client_id: impl Into<String>, client_secret: Option<String>) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(TokenError::Config("no client_id configured".into()));
        }
        Ok(Self {
            client_id,
            client_secret: client_secret.map(SecretString::from),
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_ref().map(|s| s.expose_secret())
    }
}

/// Ordered, non-empty list of requested permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    /// Build a scope set, dropping blank entries.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if no scope remains.
    pub fn new<I, S>(scopes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<String> = scopes
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if scopes.is_empty() {
            return Err(TokenError::Config("no scopes configured".into()));
        }
        Ok(Self(scopes))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Space-separated scopes, including the reserved ones, as sent on the wire.
    #[must_use]
    pub fn request_string(&self) -> String {
        let mut all: Vec<&str> = self.0.iter().map(String::as_str).collect();
        for reserved in RESERVED_SCOPES {
            if !all.iter().any(|s| s.eq_ignore_ascii_case(reserved)) {
                all.push(reserved);
            }
        }
        all.join(" ")
    }

    /// Space-separated requested scopes without the reserved ones, lower-cased.
    ///
    /// This is the `target` recorded for cached access tokens.
    #[must_use]
    pub fn target(&self) -> String {
        self.0
            .iter()
            .filter(|s| !is_reserved(s))
            .map(|s| s.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns `true` if every requested scope appears in `target`.
    #[must_use]
    pub fn is_covered_by(&self, target: &str) -> bool {
        self.0
            .iter()
            .filter(|s| !is_reserved(s))
            .all(|s| target.split_whitespace().any(|t| t.eq_ignore_ascii_case(s)))
    }
}

fn is_reserved(scope: &str) -> bool {
    RESERVED_SCOPES.iter().any(|r| r.eq_ignore_ascii_case(scope))
}

/// Error reported by the identity provider in a token reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub code: String,
    pub description: String,
    pub suberror: Option<String>,
    pub error_codes: Vec<u64>,
}

/// AAD codes for an expired, revoked or otherwise unusable refresh token.
const STALE_REFRESH_CODES: &[u64] = &[70008, 700_082, 700_084];

impl ProviderError {
    #[must_use]
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            suberror: None,
            error_codes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_suberror(mut self, suberror: impl Into<String>) -> Self {
        self.suberror = Some(suberror.into());
        self
    }

    /// Returns `true` if the refresh credential is merely stale, so the
    /// caller should fall through to a fresh authorization.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.suberror.as_deref(),
            Some("bad_token" | "token_expired")
        ) || self
            .error_codes
            .iter()
            .any(|c| STALE_REFRESH_CODES.contains(c))
    }

    /// Human-readable message, preferring the provider's description.
    #[must_use]
    pub fn message(&self) -> &str {
        if self.description.is_empty() {
            &self.code
        } else {
            &self.description
        }
    }
}

/// Outcome of a single provider exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenReply {
    pub access_token: Option<String>,
    /// UNIX seconds.
    pub expires_at: Option<u64>,
    pub error: Option<ProviderError>,
}

impl TokenReply {
    pub fn success(access_token: impl Into<String>, expires_at: Option<u64>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            expires_at,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: ProviderError) -> Self {
        Self {
            access_token: None,
            expires_at: None,
            error: Some(error),
        }
    }
}

/// Token endpoint response body, success and error fields alike.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub suberror: Option<String>,
    #[serde(default)]
    pub error_codes: Vec<u64>,
}

impl TokenResponse {
    /// Extract the provider error, if the response carries one.
    #[must_use]
    pub fn provider_error(&self) -> Option<ProviderError> {
        let code = self.error.as_ref()?;
        Some(ProviderError {
            code: code.clone(),
            description: self.error_description.clone().unwrap_or_default(),
            suberror: self.suberror.clone(),
            error_codes: self.error_codes.clone(),
        })
    }

    /// Convert to the transient reply handed to the acquisition engine.
    #[must_use]
    pub fn to_reply(&self, now: u64) -> TokenReply {
        if let Some(err) = self.provider_error() {
            return TokenReply::failure(err);
        }
        TokenReply {
            access_token: self.access_token.clone(),
            expires_at: self.expires_in.map(|secs| now.saturating_add(secs)),
            error: None,
        }
    }
}

/// A refresh token extracted from the cache. Never persisted on its own.
#[derive(Debug)]
pub struct RefreshCredential {
    pub secret: SecretString,
    /// `home_account_id` of the owning account, when known.
    pub account_hint: Option<String>,
}

impl RefreshCredential {
    #[must_use]
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

/// Which cached account/refresh credential to use.
///
/// Only `FirstFound` exists: the first entry in cache storage order wins. This
/// is intended for single-user caches; with several accounts cached the pick
/// is deterministic but arbitrary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountSelection {
    #[default]
    FirstFound,
}

/// Pending authorization-code flow. Consumed by exactly one completion attempt.
#[derive(Debug)]
pub struct AuthCodeFlowState {
    pub auth_uri: String,
    pub state: String,
    pub code_verifier: SecretString,
    pub redirect_uri: String,
}

/// Query parameters of the redirect URL pasted back by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResponse(HashMap<String, String>);

impl AuthResponse {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AuthResponse {
    /// Later duplicates replace earlier ones.
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
