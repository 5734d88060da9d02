//! HTTP transport for the annotation service.
//!
//! The service authenticates through the request body rather than headers:
//! every JSON body starts with exactly one credential key (`access_token`
//! or `id_token`), followed by the route's own fields. GET requests carry a
//! JSON body too. Each request gets the timeout of its route category.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::auth::Credential;
use crate::config::{REQUEST_TIMEOUT_SECS, URL_CHECK_TIMEOUT_SECS};
use crate::routes;
use crate::shared_client::SHARED_CLIENT;

/// HTTP error details.
#[derive(Debug, Clone)]
pub struct HttpErrorDetail {
    pub status: u16,
    pub url: String,
    pub body: String,
}

impl std::fmt::Display for HttpErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} for {}", self.status, self.url)?;
        if !self.body.is_empty() {
            let truncated: String = self.body.chars().take(200).collect();
            write!(f, ": {}", truncated)?;
        }
        Ok(())
    }
}

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {} (is_connect={})", .0, .0.is_connect())]
    Request(#[source] reqwest::Error),

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("{0}")]
    Response(HttpErrorDetail),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("json parse error: {0}")]
    JsonParse(String),
}

impl HttpError {
    /// Create an HTTP error from a response.
    pub fn from_response(status: u16, url: &str, body: Option<&str>) -> Self {
        HttpError::Response(HttpErrorDetail {
            status,
            url: url.to_string(),
            body: body.unwrap_or_default().to_string(),
        })
    }

    /// Get the HTTP status code, if available.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Response(detail) => Some(detail.status),
            HttpError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    fn from_send(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            HttpError::Timeout(url.to_string())
        } else {
            HttpError::Request(err)
        }
    }
}

/// Body for routes that take nothing beyond the credential.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NoBody {}

/// Merge the credential and a route body into one JSON object.
///
/// The credential key always comes first; a body field with the same name
/// cannot override it.
pub fn envelope<B: Serialize>(
    credential: Option<&Credential>,
    body: &B,
) -> Result<Value, HttpError> {
    let body = serde_json::to_value(body).map_err(|e| HttpError::JsonParse(e.to_string()))?;
    let fields = match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(HttpError::JsonParse(format!(
                "request body must be an object, got {}",
                other
            )))
        }
    };

    let mut out = Map::new();
    if let Some(credential) = credential {
        out.insert(credential.key().to_string(), Value::String(credential.secret().to_string()));
    }
    for (k, v) in fields {
        if !out.contains_key(&k) {
            out.insert(k, v);
        }
    }
    Ok(Value::Object(out))
}

/// Async HTTP client bound to one base URL and credential.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::new("http://localhost:5000/demo", Some(Credential::AccessToken(tok)));
/// let uuids: Vec<String> = client.get(routes::DATA, &[], &query).await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
    request_timeout: Duration,
    url_check_timeout: Duration,
}

impl HttpClient {
    /// Create a client over the shared connection pool.
    pub fn new(base_url: &str, credential: Option<Credential>) -> Self {
        Self {
            client: SHARED_CLIENT.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credential,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            url_check_timeout: Duration::from_secs(URL_CHECK_TIMEOUT_SECS),
        }
    }

    /// Override the default per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_url_check_timeout(mut self, timeout: Duration) -> Self {
        self.url_check_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn url_check_timeout(&self) -> Duration {
        self.url_check_timeout
    }

    /// Same base URL and pool, different credential.
    pub fn with_credential(&self, credential: Option<Credential>) -> Self {
        Self {
            credential,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Absolute URL for a rendered route.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Verify the base URL answers before any stateful use.
    pub async fn url_check(&self) -> Result<(), HttpError> {
        let url = format!("{}?url_check=1", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.url_check_timeout)
            .send()
            .await
            .map_err(|e| HttpError::from_send(e, &url))?;
        let status = resp.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(HttpError::from_response(status, &url, Some(&text)))
    }

    /// Make a GET request with a JSON body.
    pub async fn get<T: DeserializeOwned, B: Serialize>(
        &self,
        route: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<T, HttpError> {
        self.send_json(Method::GET, route, params, body).await
    }

    /// Make a POST request with a JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        route: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<T, HttpError> {
        self.send_json(Method::POST, route, params, body).await
    }

    /// Make a DELETE request with a JSON body.
    pub async fn delete<T: DeserializeOwned, B: Serialize>(
        &self,
        route: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<T, HttpError> {
        self.send_json(Method::DELETE, route, params, body).await
    }

    /// Send a request and decode a JSON response.
    pub async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        route: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<T, HttpError> {
        let (url, bytes) = self.send(method, route, params, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let text = String::from_utf8_lossy(&bytes);
            HttpError::JsonParse(format!(
                "{} from {}: {}",
                e,
                url,
                text.chars().take(100).collect::<String>()
            ))
        })
    }

    /// Send a request and return the response body as text.
    pub async fn send_text<B: Serialize>(
        &self,
        method: Method,
        route: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<String, HttpError> {
        let (_, bytes) = self.send(method, route, params, body).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        route: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<(String, bytes::Bytes), HttpError> {
        let url = self.url(&routes::render(route, params));
        let payload = envelope(self.credential.as_ref(), body)?;

        let mut request = self.client.request(method.clone(), &url).json(&payload);
        if !routes::is_timeout_exempt(&method, route) {
            request = request.timeout(self.request_timeout);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| HttpError::from_send(e, &url))?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(|e| HttpError::from_send(e, &url))?;

        if !(200..300).contains(&status) {
            let text = String::from_utf8_lossy(&bytes);
            return Err(HttpError::from_response(status, &url, Some(&text)));
        }
        Ok((url, bytes))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("url_check_timeout", &self.url_check_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_envelope_puts_credential_first() {
        let cred = Credential::AccessToken("tok".to_string());
        let body = envelope(Some(&cred), &json!({"limit": 3, "access_token": "spoof"})).unwrap();
        let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["access_token", "limit"]);
        assert_eq!(body["access_token"], "tok");
    }

    #[test]
    fn test_envelope_rejects_non_object() {
        assert!(envelope(None, &json!([1, 2])).is_err());
        assert_eq!(envelope(None, &NoBody {}).unwrap(), json!({}));
    }

    #[test]
    fn test_http_error_display() {
        let err = HttpError::from_response(404, "https://api.example.com/test", Some("not found"));
        let msg = format!("{}", err);
        assert!(msg.contains("404"));
        assert!(msg.contains("not found"));
    }

    #[tokio::test]
    async fn test_get_sends_json_body() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET)
                .path("/demo/data")
                .json_body(json!({"access_token": "tok", "limit": 2}));
            then.status(200).json_body(json!(["a", "b"]));
        });

        let client = HttpClient::new(
            &server.url("/demo"),
            Some(Credential::AccessToken("tok".to_string())),
        );
        let out: Vec<String> = client.get(routes::DATA, &[], &json!({"limit": 2})).await.unwrap();
        assert_eq!(out, vec!["a", "b"]);
        m.assert_hits(1);
    }

    #[tokio::test]
    async fn test_non_success_keeps_body_verbatim() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/demo/agents");
            then.status(500).body("Agent registration failed.");
        });

        let client = HttpClient::new(&server.url("/demo"), None);
        let err = client
            .post::<Value, _>(routes::AGENTS, &[], &NoBody {})
            .await
            .unwrap_err();
        match err {
            HttpError::Response(detail) => {
                assert_eq!(detail.status, 500);
                assert_eq!(detail.body, "Agent registration failed.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_typed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/demo/data/content");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!([]));
        });

        let client = HttpClient::new(&server.url("/demo"), None)
            .with_request_timeout(Duration::from_millis(50));
        let err = client
            .get::<Value, _>(routes::DATA_CONTENT, &[], &NoBody {})
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_url_check() {
        let server = MockServer::start();
        let ok = server.mock(|when, then| {
            when.method(GET).path("/demo").query_param("url_check", "1");
            then.status(200).body("ok");
        });
        server.mock(|when, then| {
            when.method(GET).path("/missing").query_param("url_check", "1");
            then.status(404).body("Project does not exist.");
        });

        HttpClient::new(&server.url("/demo"), None).url_check().await.unwrap();
        ok.assert_hits(1);

        let err = HttpClient::new(&server.url("/missing"), None)
            .url_check()
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_url_check_uses_configured_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow").query_param("url_check", "1");
            then.status(200).delay(Duration::from_millis(500)).body("ok");
        });

        let err = HttpClient::new(&server.url("/slow"), None)
            .with_url_check_timeout(Duration::from_millis(50))
            .url_check()
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)));
    }

    #[test]
    fn test_request_failed_display_includes_connect_flag() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        let msg = HttpError::Request(err).to_string();
        assert!(msg.starts_with("request failed: "));
        assert!(msg.ends_with("(is_connect=false)"));
    }
}
