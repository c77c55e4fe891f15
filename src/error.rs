use std::fmt;
use thiserror::Error;

/// Errors raised by the conversation core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The submitted message was empty after trimming.
    #[error("message is empty")]
    InvalidInput,

    /// A reply-cycle operation was called outside its valid window.
    #[error("invalid reply state: {0}")]
    InvalidState(&'static str),

    /// Another reply is still being produced for this session.
    #[error("a reply is already in progress; wait for it to finish")]
    ReplyInFlight,
}

/// Failure reported by a completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ProviderError {
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(Some(status), message)
    }

    /// Transport-level failure (connect, read, decode) with no status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else if e.is_connect() {
            "could not connect to provider".to_string()
        } else if e.is_decode() {
            "malformed provider response".to_string()
        } else {
            e.to_string()
        };
        Self::new(status, message)
    }
}
