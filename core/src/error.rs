//! Error types for intercepted requests.
//!
//! # Design
//! Two families. `RequestError` values are never returned: the lifecycle
//! delivers them as events (`RequestEvent::Error` on the request,
//! `ResponseEvent::Close` on the paired response), matching stream-style
//! error delivery. `InterceptError` covers the setup and collaborator paths
//! (header validation, text decoding, option loading) and is returned
//! through `Result` as usual.

use thiserror::Error;

/// Errors delivered through the event channel of a request or response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// `write` after `abort` or `end`, or `end` after `abort`.
    #[error("Request aborted.")]
    WriteAfterAbort,

    /// The request was aborted; carried by the response `close` event.
    #[error("aborted")]
    Aborted,
}

impl RequestError {
    /// Stable machine-readable code, if the error carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            RequestError::WriteAfterAbort => None,
            RequestError::Aborted => Some("aborted"),
        }
    }
}

/// Errors returned while setting up or feeding an intercepted request.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {name:?}")]
    InvalidHeaderValue { name: String },

    /// Text could not be decoded with the declared encoding.
    #[error("cannot decode chunk as {encoding}: {reason}")]
    Encoding {
        encoding: &'static str,
        reason: String,
    },

    /// Request options could not be deserialized.
    #[error("invalid request options: {0}")]
    Options(#[from] serde_json::Error),

    /// The request already carries an installed lifecycle.
    #[error("request {0} is already intercepted")]
    AlreadyIntercepted(crate::request::RequestId),
}
