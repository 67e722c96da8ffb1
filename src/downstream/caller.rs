//! Single HTTP exchange with the downstream API.

use super::DownstreamError;
use anyhow::{Context, Result};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// The only status the downstream uses for success, whatever the operation.
pub const SUCCESS_STATUS: u16 = 200;

/// Request body sent downstream.
pub enum Payload {
    /// Raw JSON bytes, sent with `Content-Type: application/json`.
    Json(Vec<u8>),
    /// Form fields (token endpoint only).
    Form(Vec<(&'static str, String)>),
}

/// A response that passed the success check.
#[derive(Debug)]
pub struct DownstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl DownstreamResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, DownstreamError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Executes calls against the downstream API.
///
/// Every request carries the client identifier as `User-Agent`; the bearer
/// header is only added when the caller passes a token.
#[derive(Clone)]
pub struct DownstreamCaller {
    http_client: Client,
    user_agent: String,
}

impl DownstreamCaller {
    /// Builds a caller. `timeout` bounds each whole request when set.
    pub fn new(user_agent: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            user_agent: user_agent.into(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Sends one request and classifies the outcome.
    ///
    /// Only [`SUCCESS_STATUS`] is success. Any other status, 201 and 204
    /// included, becomes [`DownstreamError::Api`] with the raw body.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        payload: Option<Payload>,
        bearer: Option<&str>,
    ) -> Result<DownstreamResponse, DownstreamError> {
        let mut request = self
            .http_client
            .request(method.clone(), url)
            .header(USER_AGENT, &self.user_agent);

        request = match payload {
            Some(Payload::Form(fields)) => request.form(&fields),
            Some(Payload::Json(body)) => request.header(CONTENT_TYPE, "application/json").body(body),
            None => request.header(CONTENT_TYPE, "application/json"),
        };

        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    method = %method,
                    url = %url,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "downstream request failed"
                );
                return Err(DownstreamError::Transport(e));
            }
        };

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        info!(
            method = %method,
            url = %url,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "downstream call"
        );

        if status != SUCCESS_STATUS {
            return Err(DownstreamError::Api {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(DownstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn caller() -> DownstreamCaller {
        DownstreamCaller::new("shelfmark-test", Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn test_success_sets_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/entries")
            .match_header("user-agent", "shelfmark-test")
            .match_header("content-type", "application/json")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"total":0}"#)
            .create_async()
            .await;

        let url = format!("{}/api/entries", server.url());
        let response = caller()
            .call(Method::GET, &url, None, Some("tok"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 200);
        let json: serde_json::Value = response.json().unwrap();
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn test_no_bearer_means_no_authorization_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/info")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let url = format!("{}/api/info", server.url());
        caller().call(Method::GET, &url, None, None).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_created_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/entries")
            .with_status(201)
            .with_body(r#"{"id":7}"#)
            .create_async()
            .await;

        let url = format!("{}/api/entries", server.url());
        let result = caller()
            .call(Method::POST, &url, Some(Payload::Json(b"{}".to_vec())), Some("tok"))
            .await;

        match result {
            Err(DownstreamError::Api { status, body }) => {
                assert_eq!(status, 201);
                assert_eq!(body, r#"{"id":7}"#);
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_form_payload_is_url_encoded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/v2/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "password".into()),
                Matcher::UrlEncoded("username".into(), "alice".into()),
            ]))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let url = format!("{}/oauth/v2/token", server.url());
        let form = vec![
            ("grant_type", "password".to_string()),
            ("username", "alice".to_string()),
        ];
        caller()
            .call(Method::POST, &url, Some(Payload::Form(form)), None)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("http://127.0.0.1:{}/api/entries", port);
        let result = caller().call(Method::GET, &url, None, None).await;

        assert!(matches!(result, Err(DownstreamError::Transport(_))));
    }
}
