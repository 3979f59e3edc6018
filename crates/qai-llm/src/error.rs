//! Error types for provider requests and streaming

use thiserror::Error;

/// Errors surfaced while building, sending or decoding a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Connection refused, DNS or TLS failure, or a dropped stream
    #[error("network error: {0}")]
    Network(String),

    /// Connect or idle-read timeout
    #[error("timed out: {0}")]
    Timeout(String),

    /// The endpoint answered with a status >= 400
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The vendor response did not have the expected shape
    #[error("unexpected response shape: {0}")]
    ProtocolMismatch(String),

    /// Missing token, endpoint or model
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether this error belongs to the network failure class
    /// (connect/read timeout, DNS, TLS, broken connection).
    pub fn is_network(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout(_))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else if err.is_decode() {
            LlmError::ProtocolMismatch(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
