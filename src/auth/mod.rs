use axum::http::HeaderMap;


/// Query parameter accepted in place of the Authorization header
pub const QUERY_TOKEN_PARAM: &str = "authorization_token";

/// User every request acts as when auth is disabled
pub const DEFAULT_USER: &str = "default";

/// Local caller on whose behalf downstream calls are made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Resolve the caller's identity for one request
///
/// The bearer token value is taken as the local user id without any check.
/// This stands in for an external identity provider: anyone who knows a user
/// id can act as that user, so deployments must authenticate callers in
/// front of Shelfmark. The Authorization header
/// wins over the query parameter; the query parameter is only consulted when
/// the header is absent.
///
/// If auth is disabled, every request acts as [`DEFAULT_USER`].
pub fn resolve_identity(
    headers: &HeaderMap,
    query: Option<&str>,
    auth_enabled: bool,
) -> Result<Identity, TokenError> {
    if !auth_enabled {
        return Ok(Identity::new(DEFAULT_USER));
    }

    match extract_bearer_token(headers) {
        Ok(token) => Ok(Identity::new(token)),
        Err(TokenError::Missing) => extract_query_token(query).map(Identity::new),
        Err(e) => Err(e),
    }
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    // Get Authorization header
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Extract token from the raw query string
///
/// Expected format: "...&authorization_token=<token>&..."
pub fn extract_query_token(query: Option<&str>) -> Result<String, TokenError> {
    let query = query.ok_or(TokenError::Missing)?;
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_str(query).map_err(|_| TokenError::InvalidFormat)?;

    let token = pairs
        .into_iter()
        .find(|(key, _)| key == QUERY_TOKEN_PARAM)
        .map(|(_, value)| value)
        .ok_or(TokenError::Missing)?;

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Remove the auth parameter from a raw query string
///
/// Every other segment, empty ones included, is kept byte-for-byte so the
/// remainder can be forwarded verbatim. Returns None when nothing is left.
pub fn strip_query_token(query: Option<&str>) -> Option<String> {
    let prefix = format!("{}=", QUERY_TOKEN_PARAM);
    let kept = query?
        .split('&')
        .filter(|pair| *pair != QUERY_TOKEN_PARAM && !pair.starts_with(&prefix))
        .collect::<Vec<&str>>()
        .join("&");

    if kept.is_empty() {
        None
    } else {
        Some(kept)
    }
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    // Expect "Bearer <token>"
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Neither the Authorization header nor the query parameter is present
    Missing,
    /// Invalid format (not "Bearer <token>" or an undecodable query)
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
