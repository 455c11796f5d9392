//! OpusDNS client error types

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::Quorum;

pub type Result<T> = std::result::Result<T, OpusDnsError>;

/// Header carrying the server-side request identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fields searched for a human readable message, first non-empty wins
const MESSAGE_FIELDS: &[&str] = &["message", "error", "detail", "title"];

/// Fields searched for a machine readable error code, first non-empty wins
const CODE_FIELDS: &[&str] = &["error_code", "code", "type"];

/// Fields searched for structured error details
const DETAIL_FIELDS: &[&str] = &["details", "errors"];

/// Errors returned by the OpusDNS client
#[derive(Error, Debug)]
pub enum OpusDnsError {
    #[error("Configuration error: {field}: {message}")]
    Config { field: &'static str, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: AttemptFailure,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No zones in account")]
    NoZones,

    #[error("Zone not found for {fqdn} ({zones_considered} zones considered)")]
    ZoneNotFound {
        fqdn: String,
        zones_considered: usize,
    },

    #[error(transparent)]
    PropagationTimeout(#[from] PropagationTimeout),

    #[error("Operation cancelled")]
    Cancelled,
}

impl OpusDnsError {
    pub(crate) fn config(field: &'static str, message: impl Into<String>) -> Self {
        Self::Config {
            field,
            message: message.into(),
        }
    }

    /// The API error behind this error, terminal or the last retried one
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            Self::RetriesExhausted {
                last: AttemptFailure::Status(err),
                ..
            } => Some(err),
            _ => None,
        }
    }

    /// HTTP status of the last response, if one was received
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|err| err.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_not_found)
    }

    pub fn is_conflict(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_conflict)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Non-2xx response from the OpusDNS API
#[derive(Error, Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub details: Option<Value>,
    pub request_id: Option<String>,
    pub raw_body: String,
}

impl ApiError {
    /// Build an error from a raw response, extracting whatever structure the body has
    pub fn from_response(status: u16, headers: &HeaderMap, body: &[u8]) -> Self {
        let raw_body = String::from_utf8_lossy(body).into_owned();
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut error = Self {
            status,
            error_code: None,
            message: None,
            details: None,
            request_id,
            raw_body,
        };

        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
            error.message = first_string(&map, MESSAGE_FIELDS);
            error.error_code = first_string(&map, CODE_FIELDS);
            error.details = DETAIL_FIELDS
                .iter()
                .filter_map(|key| map.get(*key))
                .find(|value| !value.is_null())
                .cloned();
        }

        if error.message.is_none() {
            let trimmed = error.raw_body.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('{') {
                error.message = Some(trimmed.to_string());
            }
        }

        error
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }

    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }

    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Whether the executor retries this status
    pub fn is_retryable(&self) -> bool {
        self.is_rate_limited() || self.is_server_error()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error (status {})", self.status)?;
        if let Some(code) = &self.error_code {
            write!(f, " [{}]", code)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id {})", request_id)?;
        }
        Ok(())
    }
}

fn first_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        // {"error": {"message": "..."}}
        Some(Value::Object(inner)) => first_string(inner, MESSAGE_FIELDS),
        _ => None,
    })
}

/// Failure of a single HTTP exchange before any response arrived
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Last failure observed by the executor before it gave up
#[derive(Error, Debug, Clone)]
pub enum AttemptFailure {
    #[error(transparent)]
    Status(ApiError),

    #[error(transparent)]
    Transport(TransportError),
}

/// Records did not become visible in time
#[derive(Error, Debug, Clone)]
#[error(
    "DNS propagation of {fqdn} not confirmed (quorum {quorum}) after {rounds} rounds in {elapsed:?}; \
     pending: [{}], confirmed at some point: [{}]",
    .pending.join(", "),
    .confirmed.join(", ")
)]
pub struct PropagationTimeout {
    pub fqdn: String,
    pub quorum: Quorum,
    pub rounds: u32,
    pub elapsed: Duration,
    /// Resolvers that did not confirm in the last round
    pub pending: Vec<String>,
    /// Resolvers that confirmed in any round
    pub confirmed: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_api_error_prefers_message_over_error_and_detail() {
        let body = br#"{"error": "bad", "detail": "worse", "message": "zone exists", "error_code": "ERROR_ZONE_EXISTS"}"#;
        let err = ApiError::from_response(409, &HeaderMap::new(), body);

        assert_eq!(err.message.as_deref(), Some("zone exists"));
        assert_eq!(err.error_code.as_deref(), Some("ERROR_ZONE_EXISTS"));
        assert!(err.is_conflict());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_api_error_falls_back_through_rules() {
        let err = ApiError::from_response(
            400,
            &HeaderMap::new(),
            br#"{"message": "", "detail": "ttl out of range", "details": {"field": "ttl"}}"#,
        );
        assert_eq!(err.message.as_deref(), Some("ttl out of range"));
        assert_eq!(err.details, Some(serde_json::json!({"field": "ttl"})));
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_api_error_nested_error_object() {
        let err = ApiError::from_response(
            500,
            &HeaderMap::new(),
            br#"{"error": {"message": "database unavailable"}}"#,
        );
        assert_eq!(err.message.as_deref(), Some("database unavailable"));
        assert!(err.is_server_error());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_api_error_plain_text_body_and_request_id() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
        let err = ApiError::from_response(502, &headers, b"Bad Gateway");

        assert_eq!(err.message.as_deref(), Some("Bad Gateway"));
        assert_eq!(err.request_id.as_deref(), Some("req-42"));
        assert_eq!(
            err.to_string(),
            "API error (status 502): Bad Gateway (request id req-42)"
        );
    }

    #[test]
    fn test_exhausted_error_exposes_last_status() {
        let last = ApiError::from_response(503, &HeaderMap::new(), b"");
        let err = OpusDnsError::RetriesExhausted {
            attempts: 4,
            last: AttemptFailure::Status(last),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("4 attempts"));
    }
}
