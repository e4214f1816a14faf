//! Microsoft identity platform (v2.0) token endpoint client.
//!
//! Implements the refresh-token grant and the Authorization Code + PKCE (S256)
//! flow. Successful exchanges are recorded into the caller's [`TokenCache`].
//! Transport failures are returned as-is and never retried here.

use async_trait::async_trait;
use oauth2_token_types::{
    AcquisitionCause, AuthCodeFlowState, AuthResponse, ClientIdentity, OAuthClient, ProviderError,
    ScopeSet, TokenCache, TokenError, TokenReply, TokenResponse, error::Result, now_secs,
};
use secrecy::ExposeSecret as _;

use crate::pkce::{Pkce, random_state};

/// Authorization and token endpoints of one authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: String,
    pub token: String,
}

impl Endpoints {
    /// Derive the v2.0 endpoints, e.g. from `https://login.microsoftonline.com/common`.
    #[must_use]
    pub fn from_authority(authority: &str) -> Self {
        let base = authority.trim_end_matches('/');
        Self {
            authorize: format!("{base}/oauth2/v2.0/authorize"),
            token: format!("{base}/oauth2/v2.0/token"),
        }
    }
}

/// [`OAuthClient`] talking to a Microsoft identity platform authority.
pub struct MicrosoftClient {
    identity: ClientIdentity,
    endpoints: Endpoints,
    http: rquest::Client,
}

impl MicrosoftClient {
    #[must_use]
    pub fn new(identity: ClientIdentity, authority: &str) -> Self {
        Self::with_http(identity, authority, rquest::Client::new())
    }

    #[must_use]
    pub fn with_http(identity: ClientIdentity, authority: &str, http: rquest::Client) -> Self {
        Self {
            identity,
            endpoints: Endpoints::from_authority(authority),
            http,
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn client_params(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> Vec<(&'static str, String)> {
        params.push(("client_id", self.identity.client_id().to_string()));
        if let Some(secret) = self.identity.client_secret() {
            params.push(("client_secret", secret.to_string()));
        }
        params
    }

    /// Build the authorization URL the user has to visit.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Config`] if the parameters cannot be URL-encoded.
    pub fn build_auth_url(
        &self,
        scopes: &ScopeSet,
        redirect_uri: &str,
        code_challenge: &str,
        state: &str,
    ) -> Result<String> {
        let query = serde_urlencoded::to_string([
            ("client_id", self.identity.client_id()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("response_mode", "query"),
            ("scope", scopes.request_string().as_str()),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ])
        .map_err(|e| TokenError::Config(format!("cannot encode authorization request: {e}")))?;
        Ok(format!("{}?{query}", self.endpoints.authorize))
    }

    /// POST a grant to the token endpoint and decode the body.
    ///
    /// Provider rejections (4xx with an `error` body) decode fine and are
    /// reported through [`TokenResponse::error`].
    async fn post_token(&self, params: Vec<(&'static str, String)>) -> Result<TokenResponse> {
        let params = self.client_params(params);
        let resp = self
            .http
            .post(&self.endpoints.token)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        let mut parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                TokenError::Acquisition {
                    cause: AcquisitionCause::MalformedProviderReply,
                    description: format!("token endpoint returned invalid JSON: {e}"),
                }
            } else {
                TokenError::transport(format!("token endpoint returned {status}"))
            }
        })?;
        if !status.is_success() && parsed.error.is_none() {
            parsed.error = Some(format!("http_{}", status.as_u16()));
        }
        tracing::debug!(
            status = status.as_u16(),
            error = ?parsed.error,
            "token endpoint replied"
        );
        Ok(parsed)
    }

    fn finish_exchange(
        &self,
        cache: &mut TokenCache,
        scopes: &ScopeSet,
        response: &TokenResponse,
        account_hint: Option<&str>,
    ) -> TokenReply {
        let now = now_secs();
        if response.error.is_none() {
            cache.record(
                self.identity.client_id(),
                scopes,
                response,
                account_hint,
                now,
            );
        }
        response.to_reply(now)
    }
}

#[async_trait]
impl OAuthClient for MicrosoftClient {
    async fn silent_check(
        &self,
        cache: &TokenCache,
        scopes: &ScopeSet,
    ) -> Result<Option<TokenReply>> {
        Ok(cache
            .find_access_token(self.identity.client_id(), scopes, now_secs())
            .map(|at| TokenReply::success(at.secret.clone(), Some(at.expires_on))))
    }

    async fn refresh_exchange(
        &self,
        cache: &mut TokenCache,
        secret: &str,
        account_hint: Option<&str>,
        scopes: &ScopeSet,
    ) -> Result<TokenReply> {
        let response = self
            .post_token(vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", secret.to_string()),
                ("scope", scopes.request_string()),
            ])
            .await?;
        Ok(self.finish_exchange(cache, scopes, &response, account_hint))
    }

    fn initiate_auth_code_flow(
        &self,
        scopes: &ScopeSet,
        redirect_uri: &str,
    ) -> Result<AuthCodeFlowState> {
        let pkce = Pkce::generate();
        let state = random_state();
        let auth_uri = self.build_auth_url(scopes, redirect_uri, &pkce.challenge, &state)?;
        Ok(AuthCodeFlowState {
            auth_uri,
            state,
            code_verifier: pkce.verifier,
            redirect_uri: redirect_uri.to_string(),
        })
    }

    async fn complete_auth_code_flow(
        &self,
        cache: &mut TokenCache,
        flow: AuthCodeFlowState,
        response: &AuthResponse,
        scopes: &ScopeSet,
    ) -> Result<TokenReply> {
        if let Some(code) = response.get("error") {
            let description = response.get("error_description").unwrap_or_default();
            return Ok(TokenReply::failure(ProviderError::new(code, description)));
        }
        if response.get("state") != Some(flow.state.as_str()) {
            return Err(TokenError::MalformedResponse(
                "state mismatch, possible CSRF attack".into(),
            ));
        }
        let code = response
            .get("code")
            .ok_or_else(|| TokenError::MalformedResponse("missing code parameter".into()))?;

        let token = self
            .post_token(vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.to_string()),
                ("redirect_uri", flow.redirect_uri.clone()),
                ("code_verifier", flow.code_verifier.expose_secret().to_string()),
                ("scope", scopes.request_string()),
            ])
            .await?;
        Ok(self.finish_exchange(cache, scopes, &token, None))
    }
}
