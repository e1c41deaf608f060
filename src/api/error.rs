//! Error Classifier
//!
//! Every HTTP exchange made by the crate ends in [`expect_status`], which maps a
//! response onto the small error taxonomy below. Classification never retries and
//! never sleeps.

use super::http::HttpResponse;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured view of a failed HTTP exchange.
///
/// When the body is JSON, `message` carries `error.message` and `fields` carries
/// every top-level field of the body so callers can dig into server diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub message: Option<String>,
    pub fields: Map<String, Value>,
}

impl ErrorDetails {
    /// Build details from a response, enriching from a JSON body when possible.
    pub fn from_response(response: &HttpResponse) -> Self {
        let mut details = Self {
            url: response.url.clone(),
            status: response.status,
            body: response.body.clone(),
            message: None,
            fields: Map::new(),
        };

        // A non-JSON body is not an error here, the enrichment is simply skipped
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&response.body) {
            details.message = map
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string());
            details.fields = map;
        }

        details
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} - {}", self.status, self.url, self.body)
    }
}

/// Errors produced by the hypermedia engine.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP 400.
    #[error("Bitbucket considered it a bad request: {0}")]
    BadRequest(ErrorDetails),

    /// HTTP 5xx.
    #[error("The client encountered a server error: {0}")]
    ServerError(ErrorDetails),

    /// Any other status that differs from the one the caller expected.
    #[error("The client encountered an error: {0}")]
    UnexpectedStatus(ErrorDetails),

    /// Network/protocol failure before a status was received.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A successful response whose body was not the JSON we needed.
    #[error("Failed to parse response JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No relationship named '{name}'")]
    UnknownRelationship { name: String },

    #[error("Action '{action}' is not available on this {kind}")]
    UnsupportedAction { action: String, kind: String },

    #[error("Resource has no '{name}' link")]
    MissingLink { name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Details for the HTTP-status variants.
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Error::BadRequest(d) | Error::ServerError(d) | Error::UnexpectedStatus(d) => Some(d),
            _ => None,
        }
    }

    /// HTTP status, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        self.details()
            .map(|d| d.status)
            .or_else(|| match self {
                Error::Transport(e) => e.status().map(|s| s.as_u16()),
                _ => None,
            })
    }

    /// The `error.message` string from a JSON error body.
    pub fn error_message(&self) -> Option<&str> {
        self.details().and_then(|d| d.message.as_deref())
    }

    /// Any top-level field from a JSON error body.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.details().and_then(|d| d.fields.get(name))
    }
}

/// Classify a response against the status the caller expects.
///
/// Any 2xx answer is accepted even when it differs from `expected`.
pub fn expect_status(response: &HttpResponse, expected: u16) -> Result<()> {
    if response.status == expected {
        return Ok(());
    }
    if (200..300).contains(&response.status) {
        tracing::debug!(
            "Accepting {} from {} (expected {})",
            response.status,
            response.url,
            expected
        );
        return Ok(());
    }

    let details = ErrorDetails::from_response(response);
    match response.status {
        400 => Err(Error::BadRequest(details)),
        s if s >= 500 => Err(Error::ServerError(details)),
        _ => Err(Error::UnexpectedStatus(details)),
    }
}

/// Format an API error for display
/// Security: Keeps the message short and avoids echoing raw response bodies
pub fn format_api_error(error: &Error) -> String {
    match error {
        Error::BadRequest(d) => match &d.message {
            Some(msg) => format!("Bad request: {}", msg),
            None => "Invalid request. Check your parameters.".to_string(),
        },
        Error::ServerError(_) => "Bitbucket is temporarily unavailable. Please try again.".to_string(),
        Error::UnexpectedStatus(d) => match d.status {
            401 => "Authentication failed. Check BITBUCKET_USERNAME/BITBUCKET_PASSWORD.".to_string(),
            403 => "Permission denied.".to_string(),
            404 => "Resource not found.".to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            s => format!("Request failed with status {}.", s),
        },
        Error::Transport(_) => {
            "Request failed. Check your network connection and try again.".to_string()
        }
        other => {
            let text = other.to_string();
            let sanitized = text
                .chars()
                .filter(|c| c.is_ascii_graphic() || *c == ' ')
                .take(80)
                .collect::<String>();
            if sanitized.len() < text.len() {
                format!("{}...", sanitized)
            } else {
                sanitized
            }
        }
    }
}
