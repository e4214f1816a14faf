//! PKCE (Proof Key for Code Exchange) and `state` generation for the
//! authorization-code flow.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore as _;
use secrecy::SecretString;
use sha2::{Digest, Sha256};

/// A PKCE verifier and its S256 challenge.
pub struct Pkce {
    /// Sent only with the token request; kept out of logs.
    pub verifier: SecretString,
    /// Sent with the authorization request.
    pub challenge: String,
}

impl Pkce {
    /// Generate a fresh pair from 32 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes::<32>());
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier: SecretString::from(verifier),
            challenge,
        }
    }
}

/// Random, URL-safe `state` value binding a redirect to its request.
#[must_use]
pub fn random_state() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<16>())
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret as _;

    fn is_base64url(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_challenge_is_s256_of_verifier() {
        let pkce = Pkce::generate();
        let expected =
            URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.expose_secret().as_bytes()));
        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn test_verifier_length_within_rfc7636_bounds() {
        let pkce = Pkce::generate();
        let len = pkce.verifier.expose_secret().len();
        assert!((43..=128).contains(&len), "verifier length {len}");
        assert!(is_base64url(pkce.verifier.expose_secret()));
    }

    #[test]
    fn test_state_is_random_and_url_safe() {
        let s1 = random_state();
        let s2 = random_state();
        assert_ne!(s1, s2);
        assert!(is_base64url(&s1));
    }
}
