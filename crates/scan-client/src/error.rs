//! Client error types.

use thiserror::Error;

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the telemetry server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Server root address failed validation.
    #[error("Invalid server address: {0}")]
    InvalidAddress(#[from] crate::connection::AddressError),

    /// Invalid URL format.
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// HTTP transport error (connection failed, timeout, body read, etc.).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status {
        /// Numeric HTTP status code
        status: u16,
        /// Request URL that produced the status
        url: String,
    },

    /// Response arrived but could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// How a failed fetch should be treated by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network hiccup or overloaded server; retry on the next tick.
    Transient,
    /// Requested time point is no longer (or not yet) available.
    Gone,
    /// Malformed request or unexpected reply; logged and retried like `Transient`.
    Protocol,
}

impl FailureClass {
    /// Whether the next scheduled tick should simply try again.
    #[must_use]
    pub fn is_retriable(self) -> bool {
        !matches!(self, Self::Gone)
    }
}

impl ClientError {
    /// Classify this error for retry / pause decisions.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Status { status, .. } => classify_status(*status),
            Self::Transport(err) => {
                if let Some(status) = err.status() {
                    return classify_status(status.as_u16());
                }
                if err.is_builder() || err.is_decode() || err.is_redirect() {
                    FailureClass::Protocol
                } else {
                    // timeouts, connect failures, truncated bodies
                    FailureClass::Transient
                }
            }
            Self::InvalidAddress(_) | Self::UrlParse(_) | Self::InvalidResponse(_) => {
                FailureClass::Protocol
            }
        }
    }
}

/// Map an HTTP status code to a failure class.
#[must_use]
pub fn classify_status(status: u16) -> FailureClass {
    match status {
        404 | 410 => FailureClass::Gone,
        408 | 429 => FailureClass::Transient,
        500..=599 => FailureClass::Transient,
        _ => FailureClass::Protocol,
    }
}
