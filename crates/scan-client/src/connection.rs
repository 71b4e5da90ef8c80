//! Server address configuration and URL normalization.
//!
//! - [`ServerAddress`]: Validated server root URL with source tracking
//! - [`AddressSource`]: Where the address configuration came from
//! - [`AddressError`]: User-friendly validation errors
//!
//! # Address Resolution Precedence
//!
//! Addresses are resolved in this order (highest priority first):
//! 1. Command line / explicit input
//! 2. Value from the configuration file
//! 3. `RUST_SCAN_SERVER_URL` environment variable
//! 4. Default: `http://localhost:8000/RBNB`
//!
//! # URL Normalization
//!
//! The [`normalize_url`] function handles common input formats:
//! - Bare host:port (e.g., `10.0.0.5:8000/RBNB` → `http://10.0.0.5:8000/RBNB`)
//! - Missing port (e.g., `http://localhost/RBNB` → `http://localhost:8000/RBNB`)
//! - Trailing slashes are dropped from the path so channel paths join cleanly
//!
//! # Example
//!
//! ```
//! use scan_client::connection::{ServerAddress, AddressSource};
//!
//! let addr = ServerAddress::parse("10.0.0.5:8000/RBNB/", AddressSource::UserInput)?;
//! assert_eq!(addr.as_str(), "http://10.0.0.5:8000/RBNB");
//! # Ok::<(), scan_client::connection::AddressError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Environment variable consulted by [`resolve_address`].
pub const ENV_SERVER_URL: &str = "RUST_SCAN_SERVER_URL";

/// Default HTTP port of the telemetry server.
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Default server root when no configuration is provided.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000/RBNB";

/// Source of the server address configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressSource {
    /// Hardcoded default
    Default,
    /// Loaded from `RUST_SCAN_SERVER_URL`
    Environment,
    /// Read from the configuration file
    Config,
    /// Given on the command line
    UserInput,
}

impl AddressSource {
    /// Returns a short label for log output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Environment => "env",
            Self::Config => "config",
            Self::UserInput => "user",
        }
    }
}

impl fmt::Display for AddressSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Environment => write!(f, "Environment ({ENV_SERVER_URL})"),
            Self::Config => write!(f, "Configuration file"),
            Self::UserInput => write!(f, "User input"),
        }
    }
}

/// Validated server root with metadata.
///
/// The root is the URL prefix every channel path is appended to, e.g.
/// `http://host:8000/RBNB` + `Source/chan.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    url: Url,
    source: AddressSource,
    original: String,
}

impl ServerAddress {
    /// Parse and normalize a server root URL.
    pub fn parse(input: &str, source: AddressSource) -> Result<Self, AddressError> {
        let url = normalize_url(input)?;
        Ok(Self {
            url,
            source,
            original: input.to_string(),
        })
    }

    /// Returns the normalized URL string (no trailing slash).
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    /// Returns the parsed root URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns where this address came from.
    #[must_use]
    pub fn source(&self) -> AddressSource {
        self.source
    }

    /// Returns the original input string before normalization.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Build the URL of a channel below this root.
    ///
    /// Each `/`-separated segment of `channel` is pushed individually so
    /// reserved characters inside a name get percent-encoded.
    pub fn channel_url(&self, channel: &str) -> Result<Url, AddressError> {
        let mut url = self.url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| AddressError::InvalidUrl("URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            for part in channel.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
        }
        Ok(url)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ServerAddress {
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self::parse(DEFAULT_SERVER_URL, AddressSource::Default)
            .expect("Default URL should always parse")
    }
}

/// URL validation error with user-friendly messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input was empty or whitespace-only
    EmptyInput,
    /// URL parsing failed
    InvalidUrl(String),
    /// No host was found in the URL
    MissingHost,
    /// Port could not be set
    InvalidPort(String),
    /// Unsupported URL scheme (only http/https allowed)
    UnsupportedScheme(String),
}

impl std::error::Error for AddressError {}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "Address cannot be empty"),
            Self::InvalidUrl(e) => write!(f, "Invalid URL: {e}"),
            Self::MissingHost => write!(f, "URL must include a host"),
            Self::InvalidPort(e) => write!(f, "Invalid port: {e}"),
            Self::UnsupportedScheme(s) => write!(f, "Unsupported scheme '{s}' (use http or https)"),
        }
    }
}

/// Normalize a server root URL string.
///
/// - Adds `http://` scheme if missing
/// - Adds default port (8000) if missing
/// - Trims whitespace and trailing slashes
///
/// ```
/// use scan_client::connection::normalize_url;
///
/// let url = normalize_url("192.168.1.100:8000/RBNB")?;
/// assert_eq!(url.as_str(), "http://192.168.1.100:8000/RBNB");
///
/// let url = normalize_url("https://telemetry.example.com/RBNB/")?;
/// assert_eq!(url.as_str(), "https://telemetry.example.com:8000/RBNB");
/// # Ok::<(), scan_client::connection::AddressError>(())
/// ```
pub fn normalize_url(input: &str) -> Result<Url, AddressError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(AddressError::EmptyInput);
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("http://{input}")
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| AddressError::InvalidUrl(e.to_string()))?;

    let scheme = url.scheme().to_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(AddressError::UnsupportedScheme(scheme));
    }

    if url.host().is_none() {
        return Err(AddressError::MissingHost);
    }

    if url.port().is_none() {
        url.set_port(Some(DEFAULT_HTTP_PORT))
            .map_err(|()| AddressError::InvalidPort("Cannot set port on this URL".to_string()))?;
    }

    let trimmed = url.path().trim_end_matches('/').to_string();
    url.set_path(&trimmed);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Resolve the server address from multiple sources with precedence.
///
/// Invalid higher-priority inputs are skipped with a warning; the result
/// never fails and falls back to [`DEFAULT_SERVER_URL`].
pub fn resolve_address(user_input: Option<&str>, config_value: Option<&str>) -> ServerAddress {
    let candidates = [
        (user_input.map(str::to_string), AddressSource::UserInput),
        (config_value.map(str::to_string), AddressSource::Config),
        (std::env::var(ENV_SERVER_URL).ok(), AddressSource::Environment),
    ];

    for (input, source) in candidates {
        let Some(input) = input else { continue };
        if input.trim().is_empty() {
            continue;
        }
        match ServerAddress::parse(&input, source) {
            Ok(addr) => return addr,
            Err(e) => tracing::warn!(%input, source = source.label(), "Ignoring server address: {e}"),
        }
    }

    ServerAddress::default()
}
