//! Typed access to the downstream resources.

use super::caller::{DownstreamResponse, Payload};
use super::lifecycle::{requires_auth, TokenLifecycle};
use super::request::{build_url, EntriesGetOptions, EntriesPostOptions, QueryOptions};
use super::types::{Entry, Info, PaginatedEntries};
use super::{DownstreamError, INFO_ENDPOINT};
use crate::credentials::{CredentialSet, Token};
use reqwest::Method;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Repeated query key carrying one URL digest each
const EXISTS_HASH_PARAM: &str = "hashed_urls[]";

/// Client bound to one credential set.
///
/// Re-authentication replaces the held credentials in place. The client never
/// persists anything: compare [`ReadLaterClient::token`] before and after a
/// call to detect a rotation.
pub struct ReadLaterClient {
    lifecycle: Arc<TokenLifecycle>,
    credentials: CredentialSet,
}

impl ReadLaterClient {
    pub fn new(lifecycle: Arc<TokenLifecycle>, mut credentials: CredentialSet) -> Self {
        let trimmed = credentials.server_base_url.trim_end_matches('/').len();
        credentials.server_base_url.truncate(trimmed);
        Self {
            lifecycle,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    pub fn into_credentials(self) -> CredentialSet {
        self.credentials
    }

    pub fn token(&self) -> Option<&Token> {
        self.credentials.token.as_ref()
    }

    /// Authenticates with the password grant and installs the first token.
    pub async fn fetch_token(&mut self) -> Result<&Token, DownstreamError> {
        let token = self.lifecycle.fetch_token(&self.credentials).await?;
        self.credentials = self.credentials.with_token(token);
        self.credentials
            .token
            .as_ref()
            .ok_or(DownstreamError::NotAuthenticated)
    }

    pub async fn info(&mut self) -> Result<Info, DownstreamError> {
        self.send(Method::GET, INFO_ENDPOINT, None, None)
            .await?
            .json()
    }

    pub async fn entries(
        &mut self,
        options: Option<&EntriesGetOptions>,
    ) -> Result<PaginatedEntries, DownstreamError> {
        let options = options.map(|o| o as &dyn QueryOptions);
        self.send(Method::GET, "/api/entries", options, None)
            .await?
            .json()
    }

    pub async fn entry(&mut self, id: i64) -> Result<Entry, DownstreamError> {
        let path = format!("/api/entries/{}", id);
        self.send(Method::GET, &path, None, None).await?.json()
    }

    /// Looks up which of `urls` are already saved.
    ///
    /// URLs travel as SHA-1 hex digests. Each URL the downstream answers for
    /// maps to its entry id, or None when it is not saved.
    pub async fn entries_exists(
        &mut self,
        urls: &[&str],
    ) -> Result<HashMap<String, Option<i64>>, DownstreamError> {
        if urls.is_empty() {
            return Ok(HashMap::new());
        }

        let digests: Vec<(String, &str)> = urls
            .iter()
            .map(|url| (hex::encode(Sha1::digest(url.as_bytes())), *url))
            .collect();
        let mut pairs: Vec<(&str, &str)> = digests
            .iter()
            .map(|(digest, _)| (EXISTS_HASH_PARAM, digest.as_str()))
            .collect();
        pairs.push(("return_id", "1"));
        let query = serde_urlencoded::to_string(&pairs)
            .map_err(|e| DownstreamError::Encode(e.to_string()))?;

        let path = format!("/api/entries/exists?{}", query);
        let found: HashMap<String, Option<i64>> =
            self.send(Method::GET, &path, None, None).await?.json()?;

        let urls_by_digest: HashMap<&str, &str> = digests
            .iter()
            .map(|(digest, url)| (digest.as_str(), *url))
            .collect();
        Ok(found
            .into_iter()
            .filter_map(|(digest, id)| {
                urls_by_digest
                    .get(digest.as_str())
                    .map(|url| (url.to_string(), id))
            })
            .collect())
    }

    /// Deletes an entry. The downstream answers with the deleted entry.
    pub async fn delete_entry(&mut self, id: i64) -> Result<Entry, DownstreamError> {
        let path = format!("/api/entries/{}", id);
        self.send(Method::DELETE, &path, None, None).await?.json()
    }

    /// Saves `url` as a new entry.
    ///
    /// Options travel in the JSON body, flattened to strings like query options.
    pub async fn save_entry(
        &mut self,
        url: &str,
        options: Option<&EntriesPostOptions>,
    ) -> Result<Entry, DownstreamError> {
        let mut fields: BTreeMap<&'static str, String> = match options {
            Some(options) => {
                options.validate()?;
                options.to_pairs()
            }
            None => BTreeMap::new(),
        };
        fields.insert("url", url.to_string());

        let body = serde_json::to_vec(&fields).map_err(|e| DownstreamError::Encode(e.to_string()))?;
        self.send(Method::POST, "/api/entries", None, Some(Payload::Json(body)))
            .await?
            .json()
    }

    async fn send(
        &mut self,
        method: Method,
        path: &str,
        options: Option<&dyn QueryOptions>,
        payload: Option<Payload>,
    ) -> Result<DownstreamResponse, DownstreamError> {
        let url = build_url(&self.credentials.server_base_url, path, options)?;
        let auth = requires_auth(path);

        self.credentials = self.lifecycle.ensure_valid(&self.credentials, auth).await?;

        let bearer = if auth {
            self.credentials.access_token()
        } else {
            None
        };
        self.lifecycle
            .caller()
            .call(method, &url, payload, bearer)
            .await
    }
}
