//! Resource payloads returned by the downstream API.
//!
//! The downstream encodes booleans as 0/1, offsets as numbers or numeric
//! strings, and timestamps with a numeric zone offset (`+0200`). The
//! newtypes here absorb those quirks.

use chrono::{DateTime, FixedOffset};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timestamp layout used on the wire.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Boolean transported as `0` / `1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntBool(pub bool);

impl<'de> Deserialize<'de> for IntBool {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i64::deserialize(deserializer)?;
        Ok(IntBool(v == 1))
    }
}

impl Serialize for IntBool {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(if self.0 { 1 } else { 0 })
    }
}

/// Integer that may arrive as `null`, a number or a numeric string.
///
/// A string that does not parse reads as `Some(0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MagicInt(pub Option<i64>);

impl<'de> Deserialize<'de> for MagicInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Null => Ok(MagicInt(None)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(|v| MagicInt(Some(v)))
                .ok_or_else(|| de::Error::custom("number out of range")),
            serde_json::Value::String(s) => Ok(MagicInt(Some(s.trim().parse().unwrap_or(0)))),
            other => Err(de::Error::custom(format!("invalid type: {}", other))),
        }
    }
}

/// Timestamp in the downstream layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp(pub DateTime<FixedOffset>);

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_str(&s, TIME_FORMAT)
            .map(Timestamp)
            .map_err(de::Error::custom)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.format(TIME_FORMAT).to_string())
    }
}

/// Service description from `/api/info`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Info {
    pub appname: String,
    pub version: String,
    #[serde(default)]
    pub allowed_registration: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Tag {
    pub id: i64,
    pub label: String,
    pub slug: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AnnotationRange {
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(rename = "startOffset", default)]
    pub start_offset: MagicInt,
    #[serde(rename = "endOffset", default)]
    pub end_offset: MagicInt,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Annotation {
    pub id: i64,
    #[serde(default)]
    pub annotator_schema_version: MagicInt,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub quote: Option<String>,
    #[serde(default)]
    pub ranges: Vec<AnnotationRange>,
    #[serde(default)]
    pub text: String,
    pub user: Option<String>,
}

/// A saved article.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Entry {
    pub id: i64,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub title: Option<String>,
    pub domain_name: Option<String>,

    pub content: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub reading_time: i64,
    pub preview_picture: Option<String>,

    #[serde(default)]
    pub is_archived: IntBool,
    pub archived_at: Option<Timestamp>,
    #[serde(default)]
    pub is_starred: IntBool,
    pub starred_at: Option<Timestamp>,

    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,

    pub url: Option<String>,
    pub hashed_url: Option<String>,
    pub origin_url: Option<String>,
    pub given_url: Option<String>,
    pub hashed_given_url: Option<String>,

    #[serde(default)]
    pub is_public: bool,
    pub uid: Option<String>,
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub published_by: Option<Vec<String>>,

    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_email: String,

    pub mimetype: Option<String>,
    pub http_status: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EmbeddedEntries {
    #[serde(default)]
    pub items: Vec<Entry>,
}

/// One page of `/api/entries`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PaginatedEntries {
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
    pub total: i64,
    #[serde(rename = "_embedded", default)]
    pub embedded: EmbeddedEntries,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_bool_unmarshal() {
        assert_eq!(serde_json::from_str::<IntBool>("1").unwrap(), IntBool(true));
        assert_eq!(serde_json::from_str::<IntBool>("0").unwrap(), IntBool(false));
        assert!(serde_json::from_str::<IntBool>("\"1\"").is_err());
    }

    #[test]
    fn test_int_bool_marshal() {
        assert_eq!(serde_json::to_string(&IntBool(true)).unwrap(), "1");
        assert_eq!(serde_json::to_string(&IntBool(false)).unwrap(), "0");
    }

    #[test]
    fn test_magic_int() {
        let cases = [
            ("null", MagicInt(None)),
            ("1", MagicInt(Some(1))),
            ("\"1\"", MagicInt(Some(1))),
            ("2.0", MagicInt(Some(2))),
            ("\"abc\"", MagicInt(Some(0))),
        ];
        for (input, expected) in cases {
            assert_eq!(serde_json::from_str::<MagicInt>(input).unwrap(), expected, "{}", input);
        }
        assert!(serde_json::from_str::<MagicInt>("[1]").is_err());
    }

    #[test]
    fn test_timestamp_layout() {
        let ts: Timestamp = serde_json::from_str("\"2024-03-01T10:15:30+0200\"").unwrap();
        assert_eq!(ts.0.timestamp(), 1_709_280_930);
        assert_eq!(
            serde_json::to_string(&ts).unwrap(),
            "\"2024-03-01T10:15:30+0200\""
        );
        assert!(serde_json::from_str::<Timestamp>("\"2024-03-01\"").is_err());
    }

    #[test]
    fn test_paginated_entries_decode() {
        let json = r#"{
            "page": 1,
            "limit": 30,
            "pages": 1,
            "total": 1,
            "_embedded": {
                "items": [{
                    "id": 42,
                    "created_at": "2024-03-01T10:15:30+0000",
                    "updated_at": "2024-03-02T08:00:00+0000",
                    "title": "Ownership in practice",
                    "domain_name": "example.org",
                    "reading_time": 7,
                    "is_archived": 0,
                    "is_starred": 1,
                    "tags": [{"id": 3, "label": "rust", "slug": "rust"}],
                    "annotations": [{
                        "id": 9,
                        "annotator_schema_version": "v1.0",
                        "quote": "borrow",
                        "ranges": [{"start": "/p[1]", "end": "/p[1]", "startOffset": "4", "endOffset": 10}],
                        "text": "",
                        "user": null
                    }],
                    "url": "https://example.org/ownership",
                    "is_public": false,
                    "user_id": 1,
                    "user_name": "alice",
                    "user_email": "alice@example.org",
                    "headers": null
                }]
            }
        }"#;

        let page: PaginatedEntries = serde_json::from_str(json).unwrap();
        assert_eq!(page.total, 1);
        let entry = &page.embedded.items[0];
        assert_eq!(entry.id, 42);
        assert_eq!(entry.is_archived, IntBool(false));
        assert_eq!(entry.is_starred, IntBool(true));
        assert_eq!(entry.tags[0].label, "rust");
        assert_eq!(entry.annotations[0].ranges[0].start_offset, MagicInt(Some(4)));
        assert!(entry.headers.is_none());
    }
}
