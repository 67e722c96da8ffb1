//! Pass-through endpoints.
//!
//! - `ANY /wallabag/api/*path` relays the call to `{server}/api/<path>`
//! - `GET /wallabag/info` returns the linked server's public service info

use super::{AppError, AppState};
use crate::auth::strip_query_token;
use crate::downstream::types::Info;
use crate::proxy::ProxyRequest;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tracing::debug;

/// Mount point of the pass-through
pub const PROXY_PREFIX: &str = "/wallabag/api";

/// Create pass-through router
pub fn create_proxy_router(state: AppState) -> Router {
    Router::new()
        .route("/wallabag/api/*path", any(proxy_handler))
        .route("/wallabag/info", get(info_handler))
        .with_state(Arc::new(state))
}

/// ANY /wallabag/api/*path - Relay to the downstream API
///
/// The tail is taken from the raw URI so percent-encoding survives. The local
/// `authorization_token` parameter is removed before the query is forwarded.
async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let identity = state.identify(&headers, uri.query())?;
    let credentials = state.linked_credentials(&identity.user_id)?;

    let tail_path = uri
        .path()
        .strip_prefix(PROXY_PREFIX)
        .unwrap_or_default()
        .to_string();
    let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|_| AppError::BadRequest(format!("unsupported method: {}", method)))?;

    debug!(
        user_id = %identity.user_id,
        method = %method,
        tail_path = %tail_path,
        "forwarding request"
    );

    let request = ProxyRequest {
        method,
        tail_path,
        query: strip_query_token(uri.query()),
        body: (!body.is_empty()).then(|| body.to_vec()),
    };
    let response = state
        .forwarder
        .forward(&identity.user_id, credentials, request)
        .await?;

    Ok(relay(response.status, response.content_type, response.body))
}

/// GET /wallabag/info - Public service info of the linked server
async fn info_handler(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<Info>, AppError> {
    let identity = state.identify(&headers, uri.query())?;
    let credentials = state.linked_credentials(&identity.user_id)?;

    let mut client = state.forwarder.client(credentials);
    let info = client.info().await?;

    Ok(Json(info))
}

/// Turn a relayed downstream response into an HTTP response
pub(crate) fn relay(status: u16, content_type: &'static str, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}
