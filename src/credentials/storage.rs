//! Encrypted credential storage using SQLite.
//!
//! One row per local user. Secrets are sealed with [`Cipher`] before they
//! reach the database.

use super::{encryption::Cipher, CredentialSet, CredentialStore, Token};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credential_sets (
///     user_id TEXT PRIMARY KEY,
///     server_url TEXT NOT NULL,
///     client_id TEXT NOT NULL,
///     client_secret TEXT NOT NULL,  -- Sealed
///     username TEXT NOT NULL,
///     password TEXT NOT NULL,       -- Sealed
///     access_token TEXT,            -- Sealed (NULL until first authentication)
///     refresh_token TEXT,           -- Sealed
///     expires_at TEXT,              -- RFC 3339
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// The three token columns are only ever written together, in one statement,
/// so a rotation is atomic.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
    cipher: Cipher,
}

impl SqliteCredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher = Cipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS credential_sets (
                user_id TEXT PRIMARY KEY,
                server_url TEXT NOT NULL,
                client_id TEXT NOT NULL,
                client_secret TEXT NOT NULL,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                access_token TEXT,
                refresh_token TEXT,
                expires_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create credential_sets table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential store connection lock poisoned"))
    }

    fn seal_token(&self, token: &Token) -> Result<(String, String, String)> {
        let access = self
            .cipher
            .seal(&token.access_token)
            .context("Failed to encrypt access token")?;
        let refresh = self
            .cipher
            .seal(&token.refresh_token)
            .context("Failed to encrypt refresh token")?;
        Ok((access, refresh, token.expires_at.to_rfc3339()))
    }
}

/// Raw row as stored, before decryption.
struct SealedRow {
    server_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<String>,
}

impl CredentialStore for SqliteCredentialStore {
    fn load(&self, user_id: &str) -> Result<Option<CredentialSet>> {
        let row = self
            .conn()?
            .query_row(
                r#"
                SELECT server_url, client_id, client_secret, username, password,
                       access_token, refresh_token, expires_at
                FROM credential_sets
                WHERE user_id = ?1
                "#,
                params![user_id],
                |row| {
                    Ok(SealedRow {
                        server_url: row.get(0)?,
                        client_id: row.get(1)?,
                        client_secret: row.get(2)?,
                        username: row.get(3)?,
                        password: row.get(4)?,
                        access_token: row.get(5)?,
                        refresh_token: row.get(6)?,
                        expires_at: row.get(7)?,
                    })
                },
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let token = match (row.access_token, row.refresh_token, row.expires_at) {
            (Some(access), Some(refresh), Some(expires_at)) => Some(Token {
                access_token: self
                    .cipher
                    .open(&access)
                    .context("Failed to decrypt access token")?,
                refresh_token: self
                    .cipher
                    .open(&refresh)
                    .context("Failed to decrypt refresh token")?,
                expires_at: DateTime::parse_from_rfc3339(&expires_at)
                    .context("Failed to parse expires_at timestamp")?
                    .with_timezone(&Utc),
            }),
            _ => None,
        };

        Ok(Some(CredentialSet {
            server_base_url: row.server_url,
            client_id: row.client_id,
            client_secret: self
                .cipher
                .open(&row.client_secret)
                .context("Failed to decrypt client secret")?,
            username: row.username,
            password: self
                .cipher
                .open(&row.password)
                .context("Failed to decrypt password")?,
            token,
        }))
    }

    fn save(&self, user_id: &str, credentials: &CredentialSet) -> Result<()> {
        let client_secret = self
            .cipher
            .seal(&credentials.client_secret)
            .context("Failed to encrypt client secret")?;
        let password = self
            .cipher
            .seal(&credentials.password)
            .context("Failed to encrypt password")?;
        let (access_token, refresh_token, expires_at) = match &credentials.token {
            Some(token) => {
                let (a, r, e) = self.seal_token(token)?;
                (Some(a), Some(r), Some(e))
            }
            None => (None, None, None),
        };
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO credential_sets (
                    user_id, server_url, client_id, client_secret, username, password,
                    access_token, refresh_token, expires_at, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                ON CONFLICT(user_id) DO UPDATE SET
                    server_url = excluded.server_url,
                    client_id = excluded.client_id,
                    client_secret = excluded.client_secret,
                    username = excluded.username,
                    password = excluded.password,
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    user_id,
                    credentials.server_base_url,
                    credentials.client_id,
                    client_secret,
                    credentials.username,
                    password,
                    access_token,
                    refresh_token,
                    expires_at,
                    now,
                ],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    fn store_token(&self, user_id: &str, token: &Token) -> Result<()> {
        let (access_token, refresh_token, expires_at) = self.seal_token(token)?;

        let updated = self
            .conn()?
            .execute(
                r#"
                UPDATE credential_sets
                SET access_token = ?2, refresh_token = ?3, expires_at = ?4, updated_at = ?5
                WHERE user_id = ?1
                "#,
                params![
                    user_id,
                    access_token,
                    refresh_token,
                    expires_at,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to store token")?;

        if updated == 0 {
            bail!("No credentials linked for user '{}'", user_id);
        }
        Ok(())
    }

    fn delete(&self, user_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute(
                "DELETE FROM credential_sets WHERE user_id = ?1",
                params![user_id],
            )
            .context("Failed to delete credentials")?;

        Ok(rows_affected > 0)
    }
}
