//! Error types for the payment API client.
//!
//! # Design
//! Status interpretation is exact: 2xx is success, 409 becomes `Versioning`
//! and every other status becomes `Api`. A 409 gets a dedicated variant
//! because callers react to it differently: the entity changed since it was
//! last read, so the caller re-fetches and retries with the fresh version.
//! Nothing in this crate retries or swallows an error.

use crate::http::Headers;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the client, the transport and the serializer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network exchange could not complete (DNS, TLS, timeout, refused).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered 409: the entity was modified concurrently.
    #[error("versioning conflict on {resource_path}: the entity was modified since it was last read")]
    Versioning { resource_path: String },

    /// The server rejected the request with a non-2xx status other than 409.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A value could not be converted to or from its declared type.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Invalid client setup, reported at construction time.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A local file operation failed (temp files, uploads, debug file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn serialization(msg: impl Into<String>) -> Self {
        Error::Serialization(msg.into())
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Versioning { .. } => Some(409),
            Error::Api(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Body of an error response: decoded JSON when possible, otherwise the raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Json(serde_json::Value),
    Text(String),
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorBody::Json(v) => write!(f, "{v}"),
            ErrorBody::Text(s) => f.write_str(s),
        }
    }
}

/// The server rejected the request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: u16,
    pub headers: Headers,
    pub body: ErrorBody,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(status: u16, url: &str, headers: Headers, body: ErrorBody) -> Self {
        let message = format!("[{status}] Error connecting to the API ({url}): {body}");
        Self {
            status,
            headers,
            body,
            message,
        }
    }

    /// The `message` field of a JSON error payload, when the server sent one.
    pub fn server_message(&self) -> Option<&str> {
        match &self.body {
            ErrorBody::Json(v) => v.get("message").and_then(|m| m.as_str()),
            ErrorBody::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_message_embeds_status_url_and_body() {
        let err = ApiError::new(
            500,
            "https://example.test/api/x",
            Headers::new(),
            ErrorBody::Text("boom".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "[500] Error connecting to the API (https://example.test/api/x): boom"
        );
    }

    #[test]
    fn server_message_reads_json_payload() {
        let err = ApiError::new(
            400,
            "u",
            Headers::new(),
            ErrorBody::Json(serde_json::json!({"id": "abc", "message": "bad space"})),
        );
        assert_eq!(err.server_message(), Some("bad space"));
    }

    #[test]
    fn status_is_exposed_for_server_errors_only() {
        let versioning = Error::Versioning {
            resource_path: "/transaction/5".to_string(),
        };
        assert_eq!(versioning.status(), Some(409));
        assert_eq!(Error::Connection("refused".into()).status(), None);
    }
}
