// HTTP surface: downstream pass-through, account linking and the save shortcut

mod error;
pub mod link;
pub mod proxy;
pub mod save;

pub use error::AppError;
pub use link::create_link_router;
pub use proxy::create_proxy_router;
pub use save::create_save_router;

use crate::auth::{resolve_identity, Identity};
use crate::credentials::{CredentialSet, CredentialStore};
use crate::proxy::ProxyForwarder;
use axum::http::HeaderMap;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared application state for every router
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub forwarder: Arc<ProxyForwarder>,
    pub auth_enabled: bool,
}

impl AppState {
    /// Resolve the local caller from the Authorization header or query.
    pub fn identify(&self, headers: &HeaderMap, query: Option<&str>) -> Result<Identity, AppError> {
        Ok(resolve_identity(headers, query, self.auth_enabled)?)
    }

    /// Load the caller's downstream link, failing with 403 when there is none.
    pub fn linked_credentials(&self, user_id: &str) -> Result<CredentialSet, AppError> {
        self.store
            .load(user_id)
            .map_err(AppError::Store)?
            .ok_or(AppError::NotLinked)
    }
}

/// Build the complete application router (shared between main and tests)
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(create_proxy_router(state.clone()))
        .merge(create_link_router(state.clone()))
        .merge(create_save_router(state))
        .layer(cors)
}
