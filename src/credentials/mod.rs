//! Downstream account credentials and their persistence.
//!
//! A [`CredentialSet`] is one local user's link to the read-it-later service:
//! where the server lives, the OAuth client pair, the account login and the
//! currently held [`Token`]. Values are immutable; a token rotation builds a
//! new `CredentialSet` through [`CredentialSet::with_token`] and the caller
//! writes it back explicitly with [`CredentialStore::store_token`].
//!
//! # Storage
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore (trait)            │
//! │  - load / save / store_token / delete    │
//! └─────────────────────────────────────────┘
//!          ↓                         ↓
//! ┌────────────────────┐   ┌────────────────────┐
//! │ SqliteCredential-  │   │ MemoryCredential-  │
//! │ Store (encrypted)  │   │ Store (tests)      │
//! └────────────────────┘   └────────────────────┘
//! ```
//!
//! # Security
//!
//! The account password is kept at rest because the downstream refresh grant
//! is unreliable and re-authentication falls back to the password grant. The
//! SQLite store encrypts it, together with the client secret and both tokens,
//! using AES-256-GCM.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod encryption;
mod memory;
mod storage;

pub use encryption::Cipher;
pub use memory::MemoryCredentialStore;
pub use storage::SqliteCredentialStore;

/// OAuth token issued by the downstream token endpoint.
///
/// Never mutated: a rotation replaces the whole value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// A token is expired from `expires_at` onwards (the boundary counts as expired).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One user's link to the downstream service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub server_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub token: Option<Token>,
}

impl CredentialSet {
    /// Returns a copy of these credentials holding `token`.
    pub fn with_token(&self, token: Token) -> Self {
        Self {
            token: Some(token),
            ..self.clone()
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.access_token.as_str())
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("server_base_url", &self.server_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

/// Persistence contract for credential records, keyed by local user id.
///
/// Implementations must make every write atomic: a reader never observes a
/// record with half of a token rotation applied.
pub trait CredentialStore: Send + Sync {
    /// Loads the record linked to `user_id`, if any.
    fn load(&self, user_id: &str) -> Result<Option<CredentialSet>>;

    /// Creates or fully replaces the record for `user_id`.
    fn save(&self, user_id: &str, credentials: &CredentialSet) -> Result<()>;

    /// Overwrites only the token of an existing record.
    ///
    /// Fails if `user_id` has no record.
    fn store_token(&self, user_id: &str, token: &Token) -> Result<()>;

    /// Removes the record. Returns false when nothing was stored.
    fn delete(&self, user_id: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_token(expires_at: DateTime<Utc>) -> Token {
        Token {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
        }
    }

    #[test]
    fn test_token_expiry_boundary_counts_as_expired() {
        let now = Utc::now();
        assert!(sample_token(now).is_expired(now));
        assert!(sample_token(now - Duration::seconds(1)).is_expired(now));
        assert!(!sample_token(now + Duration::seconds(1)).is_expired(now));
    }

    #[test]
    fn test_with_token_leaves_original_untouched() {
        let creds = CredentialSet {
            server_base_url: "https://read.example.com".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            token: None,
        };

        let rotated = creds.with_token(sample_token(Utc::now()));

        assert!(creds.token.is_none());
        assert_eq!(rotated.access_token(), Some("access"));
        assert_eq!(rotated.username, "alice");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = CredentialSet {
            server_base_url: "https://read.example.com".to_string(),
            client_id: "id".to_string(),
            client_secret: "s3cr3t".to_string(),
            username: "alice".to_string(),
            password: "hunter2".to_string(),
            token: None,
        };

        let debug = format!("{:?}", creds);
        assert!(!debug.contains("s3cr3t"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("alice"));
    }
}
