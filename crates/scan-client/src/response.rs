//! Response payload and authoritative header values.

use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::error::{ClientError, Result};

/// Optional server headers, converted to milliseconds since epoch.
///
/// The server reports `time`, `duration`, `oldest` and `newest` as float
/// seconds. Missing or unparsable headers are `None`; non-positive limits
/// are treated as missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResponseHeaders {
    /// Timestamp of this sample/frame
    pub time: Option<f64>,
    /// Duration covered by the payload
    pub duration: Option<f64>,
    /// Oldest data available on the server
    pub oldest: Option<f64>,
    /// Newest data available on the server
    pub newest: Option<f64>,
}

impl ResponseHeaders {
    /// Read the time headers from an HTTP header map.
    #[must_use]
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let get = |name: &str| {
            map.get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_seconds)
        };
        Self {
            time: get("time"),
            duration: get("duration"),
            oldest: get("oldest").filter(|t| *t > 0.0),
            newest: get("newest").filter(|t| *t > 0.0),
        }
    }

    /// Whether the server sent availability limits.
    #[must_use]
    pub fn has_limits(&self) -> bool {
        self.oldest.is_some() || self.newest.is_some()
    }
}

/// A delivered fetch.
#[derive(Debug, Clone, Default)]
pub struct DataResponse {
    /// Authoritative header values
    pub headers: ResponseHeaders,
    /// Raw body (text rows or binary payload)
    pub body: Bytes,
}

impl DataResponse {
    /// Build a response from a text body, e.g. for tests and mocks.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            headers: ResponseHeaders::default(),
            body: Bytes::from(body.into()),
        }
    }

    /// Attach header values.
    #[must_use]
    pub fn with_headers(mut self, headers: ResponseHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Body as UTF-8 text (lossy).
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parse float seconds into milliseconds.
#[must_use]
pub fn parse_seconds(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|s| s * 1000.0)
}

/// Parse the body of a time-only probe (`f=t`): the last non-empty line
/// holds float seconds.
pub fn parse_time_body(body: &str) -> Result<f64> {
    let line = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| ClientError::InvalidResponse("empty time body".to_string()))?;
    let first = line.split(',').next().unwrap_or(line);
    parse_seconds(first)
        .ok_or_else(|| ClientError::InvalidResponse(format!("unparsable time '{line}'")))
}
