//! Error types shared by the API client, event stream, and reconciliation core.

use thiserror::Error;

/// Network or HTTP failure on a pull, submit, or push-channel connect.
///
/// Always retryable from the user's point of view; never fatal to a session.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unreadable response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("push channel connect to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("push channel receive failed: {0}")]
    Receive(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return TransportError::Body {
                url: url.to_string(),
                message: err.to_string(),
            };
        }
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// A push message or snapshot entry that does not have the expected shape.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("{kind} event is missing `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("invalid `{field}` value: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}
