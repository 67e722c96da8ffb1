// Local identity resolution
pub mod auth;

// Downstream account links and their encrypted storage
pub mod credentials;

// Downstream API client, token lifecycle and wire types
pub mod downstream;

// Pass-through forwarding with token rotation
pub mod proxy;

// HTTP APIs
pub mod api;

// TOML configuration with env overrides
pub mod config;
