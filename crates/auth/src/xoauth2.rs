//! SASL XOAUTH2 initial client response, as consumed by IMAP and SMTP servers.

/// `user=<username>^Aauth=Bearer <token>^A^A`.
#[must_use]
pub fn auth_string(username: &str, access_token: &str) -> String {
    format!("user={username}\x01auth=Bearer {access_token}\x01\x01")
}
