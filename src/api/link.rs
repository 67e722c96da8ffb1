//! Downstream account linking.
//!
//! - `PUT /control/wallabag/credentials` links (or re-links) an account
//! - `GET /control/wallabag/credentials` shows the link without secrets
//! - `DELETE /control/wallabag/credentials` removes it
//! - `GET /control/wallabag/credentials/check` re-authenticates and probes the server

use super::proxy::relay;
use super::{AppError, AppState};
use crate::credentials::CredentialSet;
use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    response::{Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Request body for PUT /control/wallabag/credentials
#[derive(Deserialize)]
pub struct LinkRequest {
    pub server_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

/// Link as shown to its owner (secrets never included)
#[derive(Serialize, Deserialize, Debug)]
pub struct LinkView {
    pub server_url: String,
    pub client_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<String>,
    pub token_expired: bool,
}

impl From<&CredentialSet> for LinkView {
    fn from(credentials: &CredentialSet) -> Self {
        let now = Utc::now();
        Self {
            server_url: credentials.server_base_url.clone(),
            client_id: credentials.client_id.clone(),
            username: credentials.username.clone(),
            token_expires_at: credentials
                .token
                .as_ref()
                .map(|t| t.expires_at.to_rfc3339()),
            token_expired: credentials
                .token
                .as_ref()
                .map_or(true, |t| t.is_expired(now)),
        }
    }
}

/// Response for DELETE /control/wallabag/credentials
#[derive(Serialize)]
pub struct UnlinkResponse {
    pub success: bool,
}

/// Create account linking router
pub fn create_link_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/control/wallabag/credentials",
            get(get_link).put(put_link).delete(delete_link),
        )
        .route("/control/wallabag/credentials/check", get(check_link))
        .with_state(Arc::new(state))
}

/// PUT /control/wallabag/credentials - Authenticate and store a link
///
/// Nothing is stored unless the password grant succeeds.
async fn put_link(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    Json(request): Json<LinkRequest>,
) -> Result<Json<LinkView>, AppError> {
    let identity = state.identify(&headers, uri.query())?;
    validate_link_request(&request)?;

    let credentials = CredentialSet {
        server_base_url: request.server_url.trim().to_string(),
        client_id: request.client_id,
        client_secret: request.client_secret,
        username: request.username,
        password: request.password,
        token: None,
    };

    let mut client = state.forwarder.client(credentials);
    client.fetch_token().await?;
    let credentials = client.into_credentials();

    state
        .store
        .save(&identity.user_id, &credentials)
        .map_err(AppError::Store)?;

    info!(
        user_id = %identity.user_id,
        server_url = %credentials.server_base_url,
        "Downstream account linked"
    );

    Ok(Json(LinkView::from(&credentials)))
}

/// GET /control/wallabag/credentials - Show the current link
async fn get_link(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<LinkView>, AppError> {
    let identity = state.identify(&headers, uri.query())?;
    let credentials = state
        .store
        .load(&identity.user_id)
        .map_err(AppError::Store)?
        .ok_or_else(|| AppError::NotFound("no wallabag credentials configured".to_string()))?;

    Ok(Json(LinkView::from(&credentials)))
}

/// DELETE /control/wallabag/credentials - Remove the link
async fn delete_link(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<UnlinkResponse>, AppError> {
    let identity = state.identify(&headers, uri.query())?;
    let deleted = state
        .store
        .delete(&identity.user_id)
        .map_err(AppError::Store)?;

    if !deleted {
        return Err(AppError::NotFound(
            "no wallabag credentials configured".to_string(),
        ));
    }

    info!(user_id = %identity.user_id, "Downstream account unlinked");
    Ok(Json(UnlinkResponse { success: true }))
}

/// GET /control/wallabag/credentials/check - Prove the stored login still works
///
/// Always re-authenticates, persists the new token and relays `GET /api/config`.
async fn check_link(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let identity = state.identify(&headers, uri.query())?;
    let credentials = state.linked_credentials(&identity.user_id)?;

    let response = state.forwarder.check(&identity.user_id, credentials).await?;

    Ok(relay(response.status, response.content_type, response.body))
}

fn validate_link_request(request: &LinkRequest) -> Result<(), AppError> {
    let server_url = request.server_url.trim();
    if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
        return Err(AppError::BadRequest(
            "server_url must be an http(s) URL".to_string(),
        ));
    }

    let required = [
        ("client_id", &request.client_id),
        ("client_secret", &request.client_secret),
        ("username", &request.username),
        ("password", &request.password),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(AppError::BadRequest(format!("{} is required", field)));
        }
    }

    Ok(())
}
