//! Unified error type for the oauth2-token workspace.

use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Why a token could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionCause {
    /// The identity provider rejected the request (non-recoverable).
    ProviderError,
    /// No silent token, no usable refresh credential, and interaction is not allowed.
    CacheExhaustedNonInteractive,
    /// The provider reported success but the reply lacks an access token.
    MalformedProviderReply,
    /// Network failure talking to the provider. Never retried here.
    TransportError,
}

impl fmt::Display for AcquisitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProviderError => "provider_error",
            Self::CacheExhaustedNonInteractive => "cache_exhausted_non_interactive",
            Self::MalformedProviderReply => "malformed_provider_reply",
            Self::TransportError => "transport_error",
        })
    }
}

/// Enumerates all error kinds that can occur across oauth2-token crates.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Missing or invalid configuration, detected before any network activity.
    #[error("configuration error: {0}")]
    Config(String),

    /// The cache file exists but cannot be decoded.
    #[error("token cache {} is corrupt: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    /// Reading or writing the cache failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A token could not be produced.
    #[error("cannot fetch access token ({cause}): {description}")]
    Acquisition {
        cause: AcquisitionCause,
        description: String,
    },

    /// The cache holds no account yet.
    #[error("no accounts available, acquire a token first")]
    NoAccount,

    /// The pasted redirect response could not be parsed.
    #[error("malformed authorization response: {0}")]
    MalformedResponse(String),
}

impl TokenError {
    pub fn provider(description: impl Into<String>) -> Self {
        Self::Acquisition {
            cause: AcquisitionCause::ProviderError,
            description: description.into(),
        }
    }

    pub fn transport(description: impl Into<String>) -> Self {
        Self::Acquisition {
            cause: AcquisitionCause::TransportError,
            description: description.into(),
        }
    }

    /// Returns the acquisition cause, if this is an acquisition failure.
    #[must_use]
    pub fn cause(&self) -> Option<AcquisitionCause> {
        match self {
            Self::Acquisition { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// Returns `true` if the user has to run the interactive flow again.
    ///
    /// Headless callers should surface this as "re-authenticate", not as a
    /// transient fault.
    #[must_use]
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self.cause(),
            Some(AcquisitionCause::CacheExhaustedNonInteractive)
        )
    }
}

// ── From impls ──────────────────────────────────────────────────────────────

impl From<std::io::Error> for TokenError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(feature = "rquest")]
impl From<rquest::Error> for TokenError {
    fn from(e: rquest::Error) -> Self {
        Self::transport(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TokenError>;
