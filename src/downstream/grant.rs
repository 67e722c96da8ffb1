//! OAuth grants accepted by the downstream token endpoint.

use crate::credentials::{CredentialSet, Token};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Token endpoint response.
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Converts the payload into a token expiring `expires_in` seconds after `issued_at`.
    pub fn into_token(self, issued_at: DateTime<Utc>) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: issued_at + Duration::seconds(self.expires_in),
        }
    }
}

/// One way of obtaining a token.
#[derive(Clone)]
pub enum Grant {
    Password { username: String, password: String },
    RefreshToken { refresh_token: String },
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::Password { .. } => "password",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields for the token endpoint, client pair included.
    pub(crate) fn form(&self, client_id: &str, client_secret: &str) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", self.grant_type().to_string()),
            ("client_id", client_id.to_string()),
            ("client_secret", client_secret.to_string()),
        ];
        match self {
            Grant::Password { username, password } => {
                form.push(("username", username.clone()));
                form.push(("password", password.clone()));
            }
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token.clone()));
            }
        }
        form
    }
}

/// Grant used to recover from an expired token.
///
/// `Password` is the default: the downstream refresh grant has proven
/// unreliable, so stored account credentials are replayed instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReauthStrategy {
    #[default]
    Password,
    RefreshToken,
}

impl ReauthStrategy {
    /// Picks the grant for `credentials`.
    ///
    /// `RefreshToken` needs a held token; without one it falls back to the
    /// password grant.
    pub fn grant_for(&self, credentials: &CredentialSet) -> Grant {
        match (self, &credentials.token) {
            (ReauthStrategy::RefreshToken, Some(token)) => Grant::RefreshToken {
                refresh_token: token.refresh_token.clone(),
            },
            _ => Grant::Password {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(token: Option<Token>) -> CredentialSet {
        CredentialSet {
            server_base_url: "https://read.example.com".to_string(),
            client_id: "cid".to_string(),
            client_secret: "csecret".to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            token,
        }
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"{
            "access_token": "NmE3ZDQ4",
            "expires_in": 3600,
            "refresh_token": "OTk4ZjA5",
            "scope": null,
            "token_type": "bearer"
        }"#;

        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "NmE3ZDQ4");
        assert_eq!(response.token_type.as_deref(), Some("bearer"));
        assert!(response.scope.is_none());

        let issued_at = Utc::now();
        let token = response.into_token(issued_at);
        assert_eq!(token.expires_at, issued_at + Duration::seconds(3600));
        assert_eq!(token.refresh_token, "OTk4ZjA5");
    }

    #[test]
    fn test_token_response_requires_refresh_token() {
        let json = r#"{"access_token": "a", "expires_in": 10}"#;
        assert!(serde_json::from_str::<TokenResponse>(json).is_err());
    }

    #[test]
    fn test_password_grant_form() {
        let grant = ReauthStrategy::Password.grant_for(&credentials(None));
        let form = grant.form("cid", "csecret");

        assert_eq!(grant.grant_type(), "password");
        assert!(form.contains(&("username", "alice".to_string())));
        assert!(form.contains(&("password", "hunter2".to_string())));
        assert!(form.contains(&("client_secret", "csecret".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "refresh_token"));
    }

    #[test]
    fn test_refresh_grant_uses_held_refresh_token() {
        let token = Token {
            access_token: "a".to_string(),
            refresh_token: "r-123".to_string(),
            expires_at: Utc::now(),
        };
        let grant = ReauthStrategy::RefreshToken.grant_for(&credentials(Some(token)));
        let form = grant.form("cid", "csecret");

        assert_eq!(grant.grant_type(), "refresh_token");
        assert!(form.contains(&("refresh_token", "r-123".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "password"));
    }

    #[test]
    fn test_refresh_strategy_without_token_falls_back_to_password() {
        let grant = ReauthStrategy::RefreshToken.grant_for(&credentials(None));
        assert_eq!(grant.grant_type(), "password");
    }

    #[test]
    fn test_strategy_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            grant: ReauthStrategy,
        }
        let w: Wrapper = toml::from_str(r#"grant = "refresh_token""#).unwrap();
        assert_eq!(w.grant, ReauthStrategy::RefreshToken);
    }
}
