//! Client side of the downstream read-it-later API.
//!
//! # Call path
//!
//! ```text
//! build_url (validates options)
//!     ↓
//! requires_auth(path)?
//!     ↓ yes
//! TokenLifecycle::ensure_valid ──expired──→ POST /oauth/v2/token
//!     ↓
//! DownstreamCaller::call (User-Agent, Bearer)
//!     ↓
//! 200 → DownstreamResponse | anything else → DownstreamError::Api
//! ```
//!
//! [`ReadLaterClient`] drives this path for the typed resources; the proxy
//! drives it for arbitrary pass-through calls.

mod caller;
mod client;
mod error;
mod grant;
mod lifecycle;
mod request;
pub mod types;

pub use caller::{DownstreamCaller, DownstreamResponse, Payload, SUCCESS_STATUS};
pub use client::ReadLaterClient;
pub use error::DownstreamError;
pub use grant::{Grant, ReauthStrategy};
pub use lifecycle::{requires_auth, TokenLifecycle};
pub use request::{
    build_url, join_api_path, EntriesGetOptions, EntriesPostOptions, QueryOptions, DETAIL_VALUES,
    ORDER_VALUES, SORT_VALUES,
};

/// OAuth token endpoint.
pub const TOKEN_ENDPOINT: &str = "/oauth/v2/token";
/// Service information endpoint.
pub const INFO_ENDPOINT: &str = "/api/info";
/// Prefix of every API resource.
pub const API_PREFIX: &str = "/api";
