//! Core types and traits for the oauth2-token workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! token helper: the error taxonomy, client and scope types, the token cache
//! model, and the async traits that the store and auth crates implement.

pub mod cache;
pub mod error;
pub mod token;
pub mod traits;

pub use cache::TokenCache;
pub use error::{AcquisitionCause, TokenError};
pub use token::{
    AccountSelection, AuthCodeFlowState, AuthResponse, ClientIdentity, ProviderError,
    RefreshCredential, ScopeSet, TokenReply, TokenResponse, now_secs,
};
pub use traits::{Authorizer, CacheStore, OAuthClient};
