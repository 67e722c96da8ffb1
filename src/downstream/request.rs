//! Downstream URL construction and typed query options.

use super::{DownstreamError, API_PREFIX};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Accepted values of the `sort` option.
pub const SORT_VALUES: &[&str] = &["created", "updated", "archived"];
/// Accepted values of the `order` option.
pub const ORDER_VALUES: &[&str] = &["asc", "desc"];
/// Accepted values of the `detail` option.
pub const DETAIL_VALUES: &[&str] = &["metadata", "full"];

/// A set of options that serializes to flat `key=value` pairs.
pub trait QueryOptions: Sync {
    /// Rejects values outside the fixed enumerations.
    fn validate(&self) -> Result<(), DownstreamError>;

    /// Pairs for the options that are set, keyed by wire name.
    fn to_pairs(&self) -> BTreeMap<&'static str, String>;
}

/// Builds the absolute downstream URL for `path`.
///
/// A path that already carries a query is returned as-is: options are
/// neither validated nor appended. Otherwise options are validated first and
/// their pairs are percent-encoded (sorted by key) into the query.
pub fn build_url(
    base_url: &str,
    path: &str,
    options: Option<&dyn QueryOptions>,
) -> Result<String, DownstreamError> {
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if path.contains('?') {
        return Ok(url);
    }

    if let Some(options) = options {
        options.validate()?;
        let pairs = options.to_pairs();
        if !pairs.is_empty() {
            let query = serde_urlencoded::to_string(&pairs)
                .map_err(|e| DownstreamError::Encode(e.to_string()))?;
            url.push('?');
            url.push_str(&query);
        }
    }

    Ok(url)
}

/// Joins a caller-supplied tail onto the API prefix.
///
/// Empty and `.` segments are dropped and `..` is resolved lexically, but
/// never above the prefix: `../oauth/v2/token` stays under `/api`. Segments
/// are classified by their percent-decoded form (`%2e%2E` is `..`) and `\`
/// separates segments like `/`, matching how URL parsers normalize them.
/// Kept segments stay encoded.
pub fn join_api_path(tail: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in tail.split(['/', '\\']) {
        if segment.is_empty() {
            continue;
        }
        let decoded = urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment));
        match decoded.as_ref() {
            "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        API_PREFIX.to_string()
    } else {
        format!("{}/{}", API_PREFIX, segments.join("/"))
    }
}

fn check_enum(
    field: &'static str,
    value: &Option<String>,
    allowed: &[&str],
) -> Result<(), DownstreamError> {
    match value {
        Some(v) if !allowed.contains(&v.as_str()) => Err(DownstreamError::InvalidOption { field }),
        _ => Ok(()),
    }
}

fn flag(b: bool) -> String {
    if b { "1" } else { "0" }.to_string()
}

/// Options for listing entries (`GET /api/entries`).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntriesGetOptions {
    pub archive: Option<bool>,
    pub starred: Option<bool>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub tags: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    pub public: Option<bool>,
    pub detail: Option<String>,
    pub domain_name: Option<String>,
}

impl QueryOptions for EntriesGetOptions {
    fn validate(&self) -> Result<(), DownstreamError> {
        check_enum("sort", &self.sort, SORT_VALUES)?;
        check_enum("order", &self.order, ORDER_VALUES)?;
        check_enum("detail", &self.detail, DETAIL_VALUES)
    }

    fn to_pairs(&self) -> BTreeMap<&'static str, String> {
        let mut pairs = BTreeMap::new();
        if let Some(v) = self.archive {
            pairs.insert("archive", flag(v));
        }
        if let Some(v) = self.starred {
            pairs.insert("starred", flag(v));
        }
        if let Some(v) = &self.sort {
            pairs.insert("sort", v.clone());
        }
        if let Some(v) = &self.order {
            pairs.insert("order", v.clone());
        }
        if let Some(v) = self.page {
            pairs.insert("page", v.to_string());
        }
        if let Some(v) = self.per_page {
            pairs.insert("perPage", v.to_string());
        }
        if let Some(v) = &self.tags {
            pairs.insert("tags", v.join(","));
        }
        if let Some(v) = self.since {
            pairs.insert("since", v.timestamp().to_string());
        }
        if let Some(v) = self.public {
            pairs.insert("public", flag(v));
        }
        if let Some(v) = &self.detail {
            pairs.insert("detail", v.clone());
        }
        if let Some(v) = &self.domain_name {
            pairs.insert("domain_name", v.clone());
        }
        pairs
    }
}

/// Options for saving an entry (`POST /api/entries`).
///
/// Sent as the JSON body rather than the query, but flattened the same way.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EntriesPostOptions {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub archive: Option<bool>,
    pub starred: Option<bool>,
    pub content: Option<String>,
    pub language: Option<String>,
    pub preview_picture: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub authors: Option<Vec<String>>,
    pub public: Option<bool>,
    pub origin_url: Option<String>,
}

impl QueryOptions for EntriesPostOptions {
    fn validate(&self) -> Result<(), DownstreamError> {
        Ok(())
    }

    fn to_pairs(&self) -> BTreeMap<&'static str, String> {
        let mut pairs = BTreeMap::new();
        if let Some(v) = &self.title {
            pairs.insert("title", v.clone());
        }
        if let Some(v) = &self.tags {
            pairs.insert("tags", v.join(","));
        }
        if let Some(v) = self.archive {
            pairs.insert("archive", flag(v));
        }
        if let Some(v) = self.starred {
            pairs.insert("starred", flag(v));
        }
        if let Some(v) = &self.content {
            pairs.insert("content", v.clone());
        }
        if let Some(v) = &self.language {
            pairs.insert("language", v.clone());
        }
        if let Some(v) = &self.preview_picture {
            pairs.insert("preview_picture", v.clone());
        }
        if let Some(v) = self.published_at {
            pairs.insert("published_at", v.timestamp().to_string());
        }
        if let Some(v) = &self.authors {
            pairs.insert("authors", v.join(","));
        }
        if let Some(v) = self.public {
            pairs.insert("public", flag(v));
        }
        if let Some(v) = &self.origin_url {
            pairs.insert("origin_url", v.clone());
        }
        pairs
    }
}
