//! Locating refresh credentials in a loaded cache.

use oauth2_token_types::{AccountSelection, RefreshCredential, TokenCache};
use secrecy::SecretString;

/// Pulls refresh credentials out of a [`TokenCache`] without an account lookup.
pub struct RefreshExtractor;

impl RefreshExtractor {
    /// All refresh credentials, lazily, in cache storage order.
    ///
    /// The iterator borrows the cache, so it has to be re-created after any
    /// mutation.
    pub fn find(cache: &TokenCache) -> impl Iterator<Item = RefreshCredential> + '_ {
        cache.refresh_tokens().map(|rt| RefreshCredential {
            secret: SecretString::from(rt.secret.clone()),
            account_hint: Some(rt.home_account_id.clone()),
        })
    }

    /// The credential the acquisition should try, per `selection`.
    #[must_use]
    pub fn select(cache: &TokenCache, selection: AccountSelection) -> Option<RefreshCredential> {
        match selection {
            AccountSelection::FirstFound => Self::find(cache).next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oauth2_token_types::{ScopeSet, TokenResponse};

    fn cache_with_refresh_tokens(accounts: &[&str]) -> TokenCache {
        let scopes = ScopeSet::new(["Mail.Read"]).unwrap();
        let mut cache = TokenCache::new();
        for &account in accounts {
            let response = TokenResponse {
                refresh_token: Some(format!("rt-{account}")),
                ..TokenResponse::default()
            };
            cache.record("cid", &scopes, &response, Some(account), 0);
        }
        cache
    }

    #[test]
    fn test_find_empty_cache() {
        let cache = TokenCache::new();
        assert_eq!(RefreshExtractor::find(&cache).count(), 0);
        assert!(RefreshExtractor::select(&cache, AccountSelection::FirstFound).is_none());
    }

    #[test]
    fn test_find_single() {
        let cache = cache_with_refresh_tokens(&["acct-a"]);
        let cred = RefreshExtractor::select(&cache, AccountSelection::FirstFound).unwrap();
        assert_eq!(cred.secret(), "rt-acct-a");
        assert_eq!(cred.account_hint.as_deref(), Some("acct-a"));
    }

    #[test]
    fn test_first_found_uses_storage_order_not_insertion_order() {
        let cache = cache_with_refresh_tokens(&["zeta", "alpha"]);
        let all: Vec<_> = RefreshExtractor::find(&cache).collect();
        assert_eq!(all.len(), 2);
        let first = RefreshExtractor::select(&cache, AccountSelection::FirstFound).unwrap();
        assert_eq!(first.secret(), "rt-alpha");
    }
}
