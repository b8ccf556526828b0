//! ISBN lookup
//!
//! Resolves a scanned barcode into a `BookInfo` through the coelho lookup
//! service (`GET /isbn/search?q=<isbn>`). A miss and a failure are kept
//! apart: `Ok(None)` means the service does not know the book, `Err` means
//! the lookup itself went wrong.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::isbn::{is_valid_isbn, normalize_isbn};
use crate::models::{BookInfo, Classification};

/// User agent sent with lookup requests
const USER_AGENT: &str = concat!("moledro/", env!("CARGO_PKG_VERSION"));

/// Errors from the lookup adapter
#[derive(Error, Debug)]
pub enum LookupError {
    /// The scanned code is not a valid ISBN
    #[error("'{0}' is not a valid ISBN")]
    InvalidCode(String),

    /// The request never produced a response
    #[error("Lookup request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with an error status
    #[error("Lookup service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// The response body could not be understood
    #[error("Malformed lookup response: {0}")]
    Malformed(String),
}

/// Boundary to the external book lookup
pub trait BookLookup: Send + Sync {
    /// Look up a scanned code, `None` if the book is unknown
    fn lookup(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<BookInfo>, LookupError>> + Send;
}

/// Response body; on failure `result` holds an error description instead
#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    cached: bool,
    #[serde(default)]
    result: Option<Value>,
    /// What the service was doing when it failed
    #[serde(default)]
    when: Option<String>,
}

impl Envelope {
    fn error_message(&self) -> Option<String> {
        let detail = self.result.as_ref().and_then(Value::as_str);
        match (self.when.as_deref(), detail) {
            (Some(when), Some(detail)) => Some(format!("{} ({})", detail, when)),
            (Some(when), None) => Some(when.to_string()),
            (None, Some(detail)) => Some(detail.to_string()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolvedBook {
    title: String,
    author: String,
    image: Option<String>,
    classification: Option<ResolvedClassification>,
}

#[derive(Debug, Deserialize)]
struct ResolvedClassification {
    ddc: String,
    #[serde(default)]
    fast_subjects: Vec<String>,
}

/// HTTP client for the lookup service
pub struct HttpLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from the configured service URL and timeout
    pub fn from_config(config: &Config) -> Result<Self, LookupError> {
        Self::new(
            config.lookup_url.clone(),
            Duration::from_secs(config.lookup_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl BookLookup for HttpLookup {
    async fn lookup(&self, code: &str) -> Result<Option<BookInfo>, LookupError> {
        let isbn = checked_code(code)?;

        let url = format!("{}/isbn/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", isbn.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        parse_response(&isbn, status, &body)
    }
}

/// Normalize a scanned code, rejecting anything that is not an ISBN
pub fn checked_code(code: &str) -> Result<String, LookupError> {
    if !is_valid_isbn(code) {
        return Err(LookupError::InvalidCode(code.trim().to_string()));
    }
    Ok(normalize_isbn(code))
}

/// Interpret a lookup service response
pub fn parse_response(
    isbn: &str,
    status: StatusCode,
    body: &str,
) -> Result<Option<BookInfo>, LookupError> {
    if status == StatusCode::NOT_FOUND {
        debug!(isbn, "Book not known to lookup service");
        return Ok(None);
    }

    if !status.is_success() {
        let message = serde_json::from_str::<Envelope>(body)
            .ok()
            .and_then(|e| e.error_message())
            .unwrap_or_else(|| body.trim().to_string());
        return Err(LookupError::Service {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;

    let resolved: ResolvedBook = match (envelope.ok, envelope.result) {
        (true, Some(result)) => {
            serde_json::from_value(result).map_err(|e| LookupError::Malformed(e.to_string()))?
        }
        _ => return Ok(None),
    };

    debug!(isbn, cached = envelope.cached, "Lookup resolved");

    let classification = resolved.classification.map(|c| Classification {
        ddc: Some(c.ddc).filter(|d| !d.trim().is_empty()),
        subjects: c.fast_subjects,
    });

    Ok(Some(BookInfo {
        title: resolved.title,
        author: resolved.author,
        isbn: isbn.to_string(),
        image: resolved.image.filter(|i| !i.is_empty()),
        classification,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUNE: &str = "9780441013593";

    #[test]
    fn test_parse_full_response() {
        let body = r#"{
            "ok": true,
            "cached": false,
            "result": {
                "title": "Dune",
                "author": "Frank Herbert",
                "image": "https://img/dune.jpg",
                "classification": { "ddc": "813.54", "fast_subjects": ["Arrakis", "Deserts"] }
            }
        }"#;

        let info = parse_response(DUNE, StatusCode::OK, body).unwrap().unwrap();
        assert_eq!(info.title, "Dune");
        assert_eq!(info.author, "Frank Herbert");
        assert_eq!(info.isbn, DUNE);
        assert_eq!(info.image.as_deref(), Some("https://img/dune.jpg"));

        let classification = info.classification.unwrap();
        assert_eq!(classification.ddc.as_deref(), Some("813.54"));
        assert_eq!(classification.subjects, vec!["Arrakis", "Deserts"]);
    }

    #[test]
    fn test_parse_minimal_response() {
        let body = r#"{ "ok": true, "cached": true, "result": { "title": "T", "author": "A" } }"#;
        let info = parse_response(DUNE, StatusCode::OK, body).unwrap().unwrap();
        assert!(info.image.is_none());
        assert!(info.classification.is_none());
    }

    #[test]
    fn test_empty_ddc_is_absent() {
        let body = r#"{ "ok": true, "result": { "title": "T", "author": "A",
            "classification": { "ddc": "", "fast_subjects": ["x"] } } }"#;
        let info = parse_response(DUNE, StatusCode::OK, body).unwrap().unwrap();
        let classification = info.classification.unwrap();
        assert!(classification.ddc.is_none());
        assert_eq!(classification.subjects, vec!["x"]);
    }

    #[test]
    fn test_not_found() {
        let body = r#"{ "ok": false, "result": "\"not found\"", "when": "attempting to query addall.com" }"#;
        assert!(parse_response(DUNE, StatusCode::NOT_FOUND, body)
            .unwrap()
            .is_none());
        assert!(parse_response(DUNE, StatusCode::OK, body).unwrap().is_none());
    }

    #[test]
    fn test_service_error() {
        let body = r#"{ "ok": false, "result": "Timeout", "when": "attempting to query addall.com" }"#;
        let err = parse_response(DUNE, StatusCode::INTERNAL_SERVER_ERROR, body).unwrap_err();
        match err {
            LookupError::Service { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("addall"));
                assert!(message.contains("Timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_response(DUNE, StatusCode::OK, "<html>").unwrap_err();
        assert!(matches!(err, LookupError::Malformed(_)));

        let body = r#"{ "ok": true, "result": { "title": "Dune" } }"#;
        let err = parse_response(DUNE, StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, LookupError::Malformed(_)));
    }

    #[test]
    fn test_service_error_without_envelope() {
        let err = parse_response(DUNE, StatusCode::BAD_GATEWAY, "upstream down\n").unwrap_err();
        match err {
            LookupError::Service { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_checked_code() {
        assert_eq!(checked_code("978-0-441-01359-3").unwrap(), DUNE);
        assert!(matches!(
            checked_code("12345"),
            Err(LookupError::InvalidCode(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_code_rejected_before_request() {
        // Unroutable base URL: reaching the network would be a transport error
        let lookup = HttpLookup::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let err = lookup.lookup("not-an-isbn").await.unwrap_err();
        assert!(matches!(err, LookupError::InvalidCode(_)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let lookup = HttpLookup::new("https://example.test/", Duration::from_secs(1)).unwrap();
        assert_eq!(lookup.base_url(), "https://example.test");
    }
}
