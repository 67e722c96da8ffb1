use crate::auth::TokenError;
use crate::downstream::DownstreamError;
use crate::proxy::ProxyError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    message: String,
}

/// Errors surfaced by every Shelfmark endpoint
#[derive(Debug)]
pub enum AppError {
    /// Missing or malformed local credentials
    Unauthorized(TokenError),
    /// The caller never linked a downstream account
    NotLinked,
    NotFound(String),
    BadRequest(String),
    Downstream(DownstreamError),
    Store(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotLinked => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Downstream(e) => match e {
                DownstreamError::NotAuthenticated => StatusCode::FORBIDDEN,
                DownstreamError::InvalidOption { .. } => StatusCode::BAD_REQUEST,
                DownstreamError::Api { .. }
                | DownstreamError::Transport(_)
                | DownstreamError::Decode(_) => StatusCode::BAD_GATEWAY,
                DownstreamError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Unauthorized(e) => write!(f, "{}", e),
            AppError::NotLinked => write!(f, "no wallabag credentials configured"),
            AppError::NotFound(msg) => write!(f, "{}", msg),
            AppError::BadRequest(msg) => write!(f, "{}", msg),
            AppError::Downstream(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "credential store error: {:#}", e),
        }
    }
}

impl From<DownstreamError> for AppError {
    fn from(e: DownstreamError) -> Self {
        AppError::Downstream(e)
    }
}

impl From<ProxyError> for AppError {
    fn from(e: ProxyError) -> Self {
        match e {
            ProxyError::Downstream(e) => AppError::Downstream(e),
            ProxyError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::Unauthorized(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request rejected");
        }

        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Unauthorized(TokenError::Missing), StatusCode::UNAUTHORIZED),
            (AppError::NotLinked, StatusCode::FORBIDDEN),
            (
                AppError::Downstream(DownstreamError::NotAuthenticated),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::Downstream(DownstreamError::InvalidOption { field: "sort" }),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Downstream(DownstreamError::Api {
                    status: 404,
                    body: String::new(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::Store(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{}", error);
        }
    }

    #[test]
    fn test_api_error_message_carries_status_and_body() {
        let error = AppError::Downstream(DownstreamError::Api {
            status: 500,
            body: "boom".to_string(),
        });
        let message = error.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_proxy_error_conversion() {
        let error: AppError = ProxyError::Store(anyhow::anyhow!("locked")).into();
        assert!(matches!(error, AppError::Store(_)));

        let error: AppError = ProxyError::Downstream(DownstreamError::NotAuthenticated).into();
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
    }
}
