use anyhow::{anyhow, Context, Result};
use shelfmark::api::{build_app, AppState};
use shelfmark::config::{load_config, ShelfmarkConfig, CONFIG_PATH_ENV, ENCRYPTION_KEY_ENV};
use shelfmark::credentials::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use shelfmark::downstream::{DownstreamCaller, TokenLifecycle};
use shelfmark::proxy::ProxyForwarder;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfmark=info".into()),
        )
        .init();

    info!("Shelfmark starting...");

    // Configuration: file (optional) then env overrides
    let mut config = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(&path)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => ShelfmarkConfig::default(),
    };
    config.apply_env_overrides();

    info!(
        bind_address = %config.server.bind_address,
        auth_enabled = config.server.auth_enabled,
        user_agent = %config.downstream.user_agent,
        reauth_grant = ?config.downstream.reauth_grant,
        "Configuration loaded"
    );

    // Credential store: encrypted SQLite when a key is configured
    let store: Arc<dyn CredentialStore> = match std::env::var(ENCRYPTION_KEY_ENV) {
        Ok(key) => {
            let store = SqliteCredentialStore::new(&config.storage.database_path, &key)
                .context("Failed to initialize credential store")?;
            info!(database_path = %config.storage.database_path, "Credential store initialized");
            Arc::new(store)
        }
        Err(_) => {
            warn!(
                "{} not set, linked accounts are kept in memory and lost on restart",
                ENCRYPTION_KEY_ENV
            );
            Arc::new(MemoryCredentialStore::new())
        }
    };

    let caller = DownstreamCaller::new(
        config.downstream.user_agent.clone(),
        config.downstream.request_timeout(),
    )?;
    let lifecycle = Arc::new(TokenLifecycle::new(caller, config.downstream.reauth_grant));
    let forwarder = Arc::new(ProxyForwarder::new(lifecycle, Arc::clone(&store)));

    let app = build_app(AppState {
        store,
        forwarder,
        auth_enabled: config.server.auth_enabled,
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind_address.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!(bind_address = %config.server.bind_address, "Shelfmark listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl_c signal");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    info!("Shelfmark stopped");
    Ok(())
}
