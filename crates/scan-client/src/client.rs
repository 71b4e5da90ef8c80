//! HTTP client for the telemetry server.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::connection::ServerAddress;
use crate::error::{ClientError, Result};
use crate::request::DataQuery;
use crate::response::{parse_time_body, DataResponse, ResponseHeaders};

/// Anything that can answer a [`DataQuery`].
///
/// The scheduler only depends on this trait, so tests can drive it with an
/// in-memory source instead of a live server.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Perform one fetch.
    async fn fetch(&self, query: &DataQuery) -> Result<DataResponse>;
}

/// HTTP connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout (how long to wait for the TCP/TLS handshake)
    pub connect_timeout: Duration,
    /// Request timeout (whole request including body)
    pub request_timeout: Duration,
    /// How long idle keep-alive connections stay in the pool
    pub pool_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl ClientConfig {
    /// Fast configuration for a server on the local network.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed [`DataSource`].
#[derive(Debug, Clone)]
pub struct ScanClient {
    http: reqwest::Client,
    root: ServerAddress,
}

impl ScanClient {
    /// Create a client with default timeouts.
    pub fn new(root: ServerAddress) -> Result<Self> {
        Self::with_config(root, &ClientConfig::default())
    }

    /// Create a client with explicit timeouts.
    pub fn with_config(root: ServerAddress, config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()?;
        Ok(Self { http, root })
    }

    /// Server root this client talks to.
    #[must_use]
    pub fn root(&self) -> &ServerAddress {
        &self.root
    }

    /// Newest available timestamp of `channel`, in milliseconds.
    pub async fn newest_time(&self, channel: &str) -> Result<f64> {
        let response = self.fetch(&DataQuery::newest_time(channel)).await?;
        if let Some(newest) = response.headers.newest {
            return Ok(newest);
        }
        parse_time_body(&response.body_text())
    }
}

#[async_trait]
impl DataSource for ScanClient {
    #[instrument(skip(self), fields(channel = %query.channel, r = %query.reference), level = "debug")]
    async fn fetch(&self, query: &DataQuery) -> Result<DataResponse> {
        let url = query.to_url(&self.root)?;
        debug!(%url, "GET");

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let headers = ResponseHeaders::from_header_map(response.headers());
        let body = response.bytes().await?;
        debug!(bytes = body.len(), ?headers, "response");
        Ok(DataResponse { headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::AddressSource;

    #[test]
    fn test_config_presets() {
        let d = ClientConfig::default();
        let f = ClientConfig::fast();
        assert!(f.connect_timeout < d.connect_timeout);
        assert!(f.request_timeout < d.request_timeout);
    }

    #[test]
    fn test_client_keeps_root() {
        let root = ServerAddress::parse("localhost:8000/RBNB", AddressSource::UserInput).unwrap();
        let client = ScanClient::new(root.clone()).unwrap();
        assert_eq!(client.root(), &root);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // port 1 on loopback refuses connections
        let root = ServerAddress::parse("127.0.0.1:1/RBNB", AddressSource::UserInput).unwrap();
        let client = ScanClient::with_config(root, &ClientConfig::fast()).unwrap();
        let err = client
            .fetch(&DataQuery::newest_time("a"))
            .await
            .unwrap_err();
        assert_eq!(err.class(), crate::error::FailureClass::Transient);
    }
}
