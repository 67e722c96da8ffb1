//! Pass-through forwarding of caller requests to the downstream API.
//!
//! The forwarder is the only place that persists rotated tokens. A call with
//! an expired token takes the user's flight (see [`RefreshFlights`]), reloads
//! the stored record, and either adopts a token another call already stored
//! or re-authenticates and writes the new token before going downstream.

mod flight;


pub use flight::RefreshFlights;

use crate::credentials::{CredentialSet, CredentialStore, Token};
use crate::downstream::{
    build_url, join_api_path, requires_auth, DownstreamError, Payload, ReadLaterClient,
    TokenLifecycle,
};
use chrono::Utc;
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Path probed by a credential check.
pub const CHECK_PATH: &str = "/config";

/// Inbound request to relay.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    /// Path below the API prefix, e.g. `/entries/12`.
    pub tail_path: String,
    /// Raw query string without `?`, reattached verbatim.
    pub query: Option<String>,
    pub body: Option<Vec<u8>>,
}

/// Relayed downstream response.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum ProxyError {
    Downstream(DownstreamError),
    /// The credential store failed while reloading or persisting a token.
    Store(anyhow::Error),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Downstream(e) => write!(f, "{}", e),
            ProxyError::Store(e) => write!(f, "credential store error: {:#}", e),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Downstream(e) => Some(e),
            ProxyError::Store(e) => Some(&**e),
        }
    }
}

impl From<DownstreamError> for ProxyError {
    fn from(e: DownstreamError) -> Self {
        ProxyError::Downstream(e)
    }
}

pub struct ProxyForwarder {
    lifecycle: Arc<TokenLifecycle>,
    store: Arc<dyn CredentialStore>,
    flights: RefreshFlights,
}

impl ProxyForwarder {
    pub fn new(lifecycle: Arc<TokenLifecycle>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            lifecycle,
            store,
            flights: RefreshFlights::new(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<TokenLifecycle> {
        &self.lifecycle
    }

    /// Typed client over `credentials`, sharing this forwarder's HTTP client.
    pub fn client(&self, credentials: CredentialSet) -> ReadLaterClient {
        ReadLaterClient::new(self.lifecycle.clone(), credentials)
    }

    /// Relays `request` for `user_id`.
    ///
    /// `credentials` is the snapshot loaded for this call. A rotated token is
    /// persisted before the downstream call, so it survives a failing call.
    pub async fn forward(
        &self,
        user_id: &str,
        credentials: CredentialSet,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError> {
        if credentials.token.is_none() {
            return Err(DownstreamError::NotAuthenticated.into());
        }

        let mut path = join_api_path(&request.tail_path);
        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            path.push('?');
            path.push_str(query);
        }
        let auth = requires_auth(&path);

        let credentials = self.ensure_fresh(user_id, credentials, auth).await?;
        let url = build_url(&credentials.server_base_url, &path, None)?;
        let bearer = if auth {
            credentials.access_token()
        } else {
            None
        };
        let payload = request.body.filter(|b| !b.is_empty()).map(Payload::Json);

        let response = self
            .lifecycle
            .caller()
            .call(request.method, &url, payload, bearer)
            .await?;

        Ok(ProxyResponse {
            status: response.status,
            content_type: "application/json",
            body: response.body,
        })
    }

    /// Returns credentials usable for a call, persisting any rotation.
    ///
    /// Fresh tokens pass straight through. Expired ones are refreshed under
    /// the user's flight, so concurrent calls re-authenticate once.
    pub async fn ensure_fresh(
        &self,
        user_id: &str,
        credentials: CredentialSet,
        requires_auth: bool,
    ) -> Result<CredentialSet, ProxyError> {
        if !TokenLifecycle::needs_reauth(&credentials, requires_auth, Utc::now()) {
            if requires_auth && credentials.token.is_none() {
                return Err(DownstreamError::NotAuthenticated.into());
            }
            return Ok(credentials);
        }

        let _flight = self.flights.acquire(user_id).await;
        let current = self.adopt_stored(user_id, credentials)?;
        self.rotate(user_id, current, requires_auth).await
    }

    /// Re-authenticates regardless of the token's expiry, then probes the
    /// downstream with the new token.
    pub async fn check(
        &self,
        user_id: &str,
        credentials: CredentialSet,
    ) -> Result<ProxyResponse, ProxyError> {
        let Some(token) = &credentials.token else {
            return Err(DownstreamError::NotAuthenticated.into());
        };

        let refreshed = {
            let _flight = self.flights.acquire(user_id).await;
            let expired = credentials.with_token(Token {
                expires_at: Utc::now(),
                ..token.clone()
            });
            self.rotate(user_id, expired, true).await?
        };

        self.forward(
            user_id,
            refreshed,
            ProxyRequest {
                method: Method::GET,
                tail_path: CHECK_PATH.to_string(),
                query: None,
                body: None,
            },
        )
        .await
    }

    /// Persists `refreshed`'s token if it differs from `before`'s.
    ///
    /// Returns whether a write happened.
    pub fn persist_rotation(
        &self,
        user_id: &str,
        before: &CredentialSet,
        refreshed: &CredentialSet,
    ) -> Result<bool, ProxyError> {
        if refreshed.access_token() == before.access_token() {
            return Ok(false);
        }
        let Some(token) = &refreshed.token else {
            return Ok(false);
        };

        self.store
            .store_token(user_id, token)
            .map_err(ProxyError::Store)?;
        info!(
            user_id = %user_id,
            expires_at = %token.expires_at,
            "persisted rotated downstream token"
        );
        Ok(true)
    }

    /// Must be called with the user's flight held.
    async fn rotate(
        &self,
        user_id: &str,
        current: CredentialSet,
        requires_auth: bool,
    ) -> Result<CredentialSet, ProxyError> {
        let refreshed = self.lifecycle.ensure_valid(&current, requires_auth).await?;
        self.persist_rotation(user_id, &current, &refreshed)?;
        Ok(refreshed)
    }

    /// Prefers a still-valid token stored by a concurrent call.
    fn adopt_stored(
        &self,
        user_id: &str,
        credentials: CredentialSet,
    ) -> Result<CredentialSet, ProxyError> {
        let stored = self.store.load(user_id).map_err(ProxyError::Store)?;
        match stored {
            Some(stored)
                if stored
                    .token
                    .as_ref()
                    .is_some_and(|t| !t.is_expired(Utc::now())) =>
            {
                debug!(user_id = %user_id, "adopting token refreshed by a concurrent call");
                Ok(stored)
            }
            _ => Ok(credentials),
        }
    }
}
