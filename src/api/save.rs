//! `GET|POST /api/save` - save a URL to the linked account in one call.
//!
//! Bookmarklets send the fields as a query (GET) or a form body (POST);
//! other clients POST JSON. Tags arrive as repeated `tags[]` in forms.

use super::{AppError, AppState};
use crate::downstream::types::Entry;
use crate::downstream::{requires_auth, EntriesPostOptions};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Fields accepted by /api/save
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct SaveRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub archive: Option<bool>,
    #[serde(default)]
    pub starred: Option<bool>,
}

impl SaveRequest {
    /// Bind from urlencoded pairs
    ///
    /// `tags[]` may repeat and `tags` takes a comma list. Flags accept
    /// `1/0`, `t/f` and `true/false`. Unknown keys are ignored.
    pub fn from_form(raw: &str) -> Result<Self, AppError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
            .map_err(|e| AppError::BadRequest(format!("invalid form: {}", e)))?;

        let mut request = SaveRequest::default();
        for (key, value) in pairs {
            match key.as_str() {
                "url" => request.url = value,
                "title" => request.title = Some(value),
                "tags[]" => request.tags.get_or_insert_with(Vec::new).push(value),
                "tags" => request.tags.get_or_insert_with(Vec::new).extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                ),
                "archive" => request.archive = Some(parse_flag("archive", &value)?),
                "starred" => request.starred = Some(parse_flag("starred", &value)?),
                _ => {}
            }
        }
        Ok(request)
    }

    fn from_json(body: &[u8]) -> Result<Self, AppError> {
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
    }
}

fn parse_flag(field: &str, value: &str) -> Result<bool, AppError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(AppError::BadRequest(format!("{} must be a boolean", field))),
    }
}

/// Create save shortcut router
pub fn create_save_router(state: AppState) -> Router {
    Router::new()
        .route("/api/save", get(save_handler).post(save_handler))
        .with_state(Arc::new(state))
}

/// GET|POST /api/save - Create an entry for `url`
async fn save_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Entry>), AppError> {
    let identity = state.identify(&headers, uri.query())?;

    let request = if method == Method::POST {
        let is_json = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            SaveRequest::from_json(&body)?
        } else {
            let form = std::str::from_utf8(&body)
                .map_err(|_| AppError::BadRequest("form body is not UTF-8".to_string()))?;
            SaveRequest::from_form(form)?
        }
    } else {
        SaveRequest::from_form(uri.query().unwrap_or_default())?
    };
    if request.url.trim().is_empty() {
        return Err(AppError::BadRequest("url is required".to_string()));
    }

    let credentials = state.linked_credentials(&identity.user_id)?;
    let credentials = state
        .forwarder
        .ensure_fresh(
            &identity.user_id,
            credentials,
            requires_auth("/api/entries"),
        )
        .await?;

    let options = EntriesPostOptions {
        title: request.title,
        tags: request.tags,
        archive: request.archive,
        starred: request.starred,
        ..Default::default()
    };

    let mut client = state.forwarder.client(credentials.clone());
    let saved = client.save_entry(request.url.trim(), Some(&options)).await;

    // The token may still expire between the refresh and the call
    state
        .forwarder
        .persist_rotation(&identity.user_id, &credentials, client.credentials())?;
    let entry = saved?;

    info!(user_id = %identity.user_id, entry_id = entry.id, "Entry saved");
    Ok((StatusCode::CREATED, Json(entry)))
}
