use crate::downstream::ReauthStrategy;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable holding the config file path
pub const CONFIG_PATH_ENV: &str = "SHELFMARK_CONFIG";

/// Environment variable holding the base64 AES-256 key for the credential database
pub const ENCRYPTION_KEY_ENV: &str = "SHELFMARK_ENCRYPTION_KEY";

/// Complete Shelfmark configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShelfmarkConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// When true the caller's bearer token (or `authorization_token` query
    /// parameter) is used as the user id as-is. It is a stand-in for an
    /// external identity provider, not authentication: put Shelfmark behind a
    /// proxy that authenticates callers. When false every request acts as the
    /// `default` user.
    #[serde(default = "default_auth_enabled")]
    pub auth_enabled: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_auth_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            auth_enabled: default_auth_enabled(),
        }
    }
}

/// Downstream API client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownstreamConfig {
    /// Sent as `User-Agent` on every downstream request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whole-request timeout; 0 disables it
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub reauth_grant: ReauthStrategy,
}

fn default_user_agent() -> String {
    format!("shelfmark/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout(),
            reauth_grant: ReauthStrategy::default(),
        }
    }
}

impl DownstreamConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_seconds > 0).then(|| Duration::from_secs(self.request_timeout_seconds))
    }
}

/// Credential database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "shelfmark.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl ShelfmarkConfig {
    /// Apply `SHELFMARK_*` environment overrides on top of file values.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SHELFMARK_BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("SHELFMARK_AUTH_ENABLED") {
            if let Ok(b) = v.parse::<bool>() {
                self.server.auth_enabled = b;
            }
        }
        if let Some(v) = lookup("SHELFMARK_DATABASE_PATH") {
            self.storage.database_path = v;
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<ShelfmarkConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ShelfmarkConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ShelfmarkConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert!(config.server.auth_enabled);
        assert!(config.downstream.user_agent.starts_with("shelfmark/"));
        assert_eq!(config.downstream.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.downstream.reauth_grant, ReauthStrategy::Password);
        assert_eq!(config.storage.database_path, "shelfmark.db");
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_address = "127.0.0.1:9000"
            auth_enabled = false

            [downstream]
            user_agent = "freon"
            request_timeout_seconds = 0
            reauth_grant = "refresh_token"

            [storage]
            database_path = "/var/lib/shelfmark/credentials.db"
        "#;

        let config: ShelfmarkConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert!(!config.server.auth_enabled);
        assert_eq!(config.downstream.user_agent, "freon");
        assert_eq!(config.downstream.request_timeout(), None);
        assert_eq!(config.downstream.reauth_grant, ReauthStrategy::RefreshToken);
        assert_eq!(config.storage.database_path, "/var/lib/shelfmark/credentials.db");
    }

    #[test]
    fn test_partial_config() {
        // Missing sections and keys use defaults
        let toml = r#"
            [downstream]
            request_timeout_seconds = 5
        "#;

        let config: ShelfmarkConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.downstream.request_timeout_seconds, 5);
        assert_eq!(config.downstream.reauth_grant, ReauthStrategy::Password);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_unknown_grant_is_rejected() {
        let toml = r#"
            [downstream]
            reauth_grant = "client_credentials"
        "#;
        assert!(toml::from_str::<ShelfmarkConfig>(toml).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SHELFMARK_BIND_ADDRESS", "127.0.0.1:3000"),
            ("SHELFMARK_AUTH_ENABLED", "false"),
            ("SHELFMARK_DATABASE_PATH", "/tmp/creds.db"),
        ]
        .into_iter()
        .collect();

        let mut config = ShelfmarkConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert!(!config.server.auth_enabled);
        assert_eq!(config.storage.database_path, "/tmp/creds.db");
    }

    #[test]
    fn test_invalid_env_override_is_ignored() {
        let mut config = ShelfmarkConfig::default();
        config.apply_overrides(|key| (key == "SHELFMARK_AUTH_ENABLED").then(|| "maybe".to_string()));
        assert!(config.server.auth_enabled);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:7070\"").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:7070");
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/shelfmark.toml").is_err());
    }
}
