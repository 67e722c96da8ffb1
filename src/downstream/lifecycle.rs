//! Token freshness decisions and re-authentication.

use super::caller::{DownstreamCaller, Payload};
use super::grant::{Grant, ReauthStrategy, TokenResponse};
use super::request::build_url;
use super::{DownstreamError, INFO_ENDPOINT, TOKEN_ENDPOINT};
use crate::credentials::{CredentialSet, Token};
use chrono::{DateTime, Utc};
use reqwest::Method;
use tracing::{debug, info};

/// Whether a downstream path needs a bearer token.
///
/// Only the token endpoint and the service info endpoint are public. The
/// query component is ignored.
pub fn requires_auth(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    !(path.ends_with(TOKEN_ENDPOINT) || path.ends_with(INFO_ENDPOINT))
}

/// Keeps a credential set's token usable.
///
/// Not synchronized: two calls that both see an expired token both
/// re-authenticate. Callers that share credentials coordinate above this
/// type (see `proxy::RefreshFlights`).
pub struct TokenLifecycle {
    caller: DownstreamCaller,
    strategy: ReauthStrategy,
}

impl TokenLifecycle {
    pub fn new(caller: DownstreamCaller, strategy: ReauthStrategy) -> Self {
        Self { caller, strategy }
    }

    pub fn caller(&self) -> &DownstreamCaller {
        &self.caller
    }

    pub fn strategy(&self) -> ReauthStrategy {
        self.strategy
    }

    /// True when a call requiring auth would trigger re-authentication at `now`.
    pub fn needs_reauth(credentials: &CredentialSet, requires_auth: bool, now: DateTime<Utc>) -> bool {
        requires_auth
            && credentials
                .token
                .as_ref()
                .is_some_and(|token| token.is_expired(now))
    }

    /// Returns credentials whose token is usable for a call.
    ///
    /// `credentials` is never modified: on success the result is either a
    /// copy or a new value carrying a rotated token, and on failure the
    /// caller still holds the stale token.
    pub async fn ensure_valid(
        &self,
        credentials: &CredentialSet,
        requires_auth: bool,
    ) -> Result<CredentialSet, DownstreamError> {
        self.ensure_valid_at(credentials, requires_auth, Utc::now())
            .await
    }

    /// [`TokenLifecycle::ensure_valid`] against an explicit clock.
    pub async fn ensure_valid_at(
        &self,
        credentials: &CredentialSet,
        requires_auth: bool,
        now: DateTime<Utc>,
    ) -> Result<CredentialSet, DownstreamError> {
        if !requires_auth {
            return Ok(credentials.clone());
        }

        let Some(token) = &credentials.token else {
            return Err(DownstreamError::NotAuthenticated);
        };

        if !token.is_expired(now) {
            return Ok(credentials.clone());
        }

        info!(
            expires_at = %token.expires_at,
            grant = self.strategy.grant_for(credentials).grant_type(),
            "downstream token has expired, re-authenticating"
        );
        let token = self.reauthenticate(credentials).await?;
        Ok(credentials.with_token(token))
    }

    /// Obtains a new token with the configured strategy.
    pub async fn reauthenticate(&self, credentials: &CredentialSet) -> Result<Token, DownstreamError> {
        self.authenticate(credentials, self.strategy.grant_for(credentials))
            .await
    }

    /// Obtains a token with the password grant, whatever the strategy.
    pub async fn fetch_token(&self, credentials: &CredentialSet) -> Result<Token, DownstreamError> {
        let grant = Grant::Password {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };
        self.authenticate(credentials, grant).await
    }

    /// Posts `grant` to the token endpoint and builds the resulting token.
    pub async fn authenticate(
        &self,
        credentials: &CredentialSet,
        grant: Grant,
    ) -> Result<Token, DownstreamError> {
        let url = build_url(&credentials.server_base_url, TOKEN_ENDPOINT, None)?;
        let form = grant.form(&credentials.client_id, &credentials.client_secret);

        let response = self
            .caller
            .call(Method::POST, &url, Some(Payload::Form(form)), None)
            .await?;
        let payload: TokenResponse = response.json()?;

        debug!(
            grant = grant.grant_type(),
            token_type = payload.token_type.as_deref().unwrap_or("unknown"),
            scope = payload.scope.as_deref().unwrap_or(""),
            expires_in = payload.expires_in,
            "downstream token issued"
        );

        Ok(payload.into_token(Utc::now()))
    }
}
