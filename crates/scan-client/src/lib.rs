//! HTTP client library for the telemetry data server.
//!
//! This crate builds fetch URLs for numeric, image and audio channels,
//! performs them over HTTP and classifies failures. It is UI-agnostic and
//! is used by the `rust-scan` playback engine and CLI.

pub mod client;
pub mod connection;
pub mod error;
pub mod request;
pub mod response;

pub use client::{ClientConfig, DataSource, ScanClient};
pub use connection::{
    normalize_url, resolve_address, AddressError, AddressSource, ServerAddress, DEFAULT_HTTP_PORT,
    DEFAULT_SERVER_URL, ENV_SERVER_URL,
};
pub use error::{classify_status, ClientError, FailureClass, Result};
pub use request::{DataQuery, DataType, Format, RefMode};
pub use response::{parse_seconds, parse_time_body, DataResponse, ResponseHeaders};
