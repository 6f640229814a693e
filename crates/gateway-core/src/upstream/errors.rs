use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

/// Transport-level failures of a single upstream call.
///
/// Surfaced unchanged to the routing strategy, which decides whether another
/// upstream is tried.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// The call did not complete within its deadline.
    #[error("timeout error")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The upstream answered with a non-success HTTP status. `body` is kept whole
    /// so a JSON-RPC error payload can still be forwarded.
    #[error("HTTP error {status}")]
    HttpError { status: u16, body: Bytes },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid upstream URL {0}: {1}")]
    InvalidUrl(String, String),

    #[error("Unsupported upstream URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The stream transport has stopped and can no longer accept calls.
    #[error("stream upstream closed")]
    StreamClosed,
}

impl UpstreamError {
    /// The JSON-RPC response an upstream sent along with a failing HTTP status.
    ///
    /// Only bodies that are JSON objects count; plain-text or HTML error pages
    /// yield `None`.
    #[must_use]
    pub fn answered_body(&self) -> Option<&Bytes> {
        match self {
            Self::HttpError { body, .. }
                if serde_json::from_slice::<Map<String, Value>>(body).is_ok() =>
            {
                Some(body)
            }
            _ => None,
        }
    }

    /// Short label used for metrics.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::HttpError { .. } => "http_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::InvalidUrl(..) => "invalid_url",
            Self::UnsupportedScheme(_) => "unsupported_scheme",
            Self::StreamClosed => "stream_closed",
        }
    }
}
