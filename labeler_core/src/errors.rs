//! Core error types for the labeler client.
//!
//! Every fallible operation in the crate returns [`CoreResult`]. Batch
//! pipelines (annotation submission, verification and reconciliation writes)
//! turn per-record failures into result entries instead of errors.

use crate::http::HttpError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Details of a non-success response from the annotation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteErrorInfo {
    /// HTTP status code (e.g., 404, 500)
    pub status: u16,
    /// Request URL
    pub url: String,
    /// Response body, verbatim
    pub body: String,
}

impl std::fmt::Display for RemoteErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The service reports failures as plain text; surface it as-is.
        if self.body.trim().is_empty() {
            write!(f, "HTTP {} for {}", self.status, self.url)
        } else {
            write!(f, "{}", self.body)
        }
    }
}

/// Unified error enum for the labeler client.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Missing or inconsistent init parameter (project, credential, active schema)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Schema-invalid model configuration or missing query field
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced agent or job does not resolve
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-success HTTP status from the service
    #[error("{0}")]
    Remote(RemoteErrorInfo),

    /// Request exceeded its route timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Required external API key is absent
    #[error("credential error: {0}")]
    Credential(String),

    /// URL parsing failed
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// HTTP request failed (network layer)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Undecodable payload or malformed token
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Create a remote (non-success status) error.
    pub fn remote(status: u16, url: &str, body: &str) -> Self {
        CoreError::Remote(RemoteErrorInfo {
            status,
            url: url.to_string(),
            body: body.to_string(),
        })
    }

    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        CoreError::Timeout(message.into())
    }

    pub fn credential(message: impl Into<String>) -> Self {
        CoreError::Credential(message.into())
    }

    /// Check if this is a timeout, either typed or from the network layer.
    pub fn is_timeout(&self) -> bool {
        match self {
            CoreError::Timeout(_) => true,
            CoreError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Get HTTP status code if this is an HTTP error.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            CoreError::Remote(info) => Some(info.status),
            CoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<HttpError> for CoreError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) => CoreError::Http(e),
            HttpError::Timeout(url) => CoreError::Timeout(format!("request to {} timed out", url)),
            HttpError::Response(detail) => CoreError::Remote(RemoteErrorInfo {
                status: detail.status,
                url: detail.url,
                body: detail.body,
            }),
            HttpError::InvalidUrl(msg) => CoreError::Configuration(msg),
            HttpError::JsonParse(msg) => CoreError::Protocol(msg),
        }
    }
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
