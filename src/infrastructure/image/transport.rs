//! HTTP transport for image downloads.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::domain::errors::ImageError;
use crate::domain::ports::ImageTransport;

use super::loader::ImageLoaderConfig;

/// `reqwest`-backed transport with connect and total timeouts.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport using the timeouts from `config`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &ImageLoaderConfig) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("slotimg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ImageError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageTransport for HttpTransport {
    async fn open(&self, url: &str) -> Result<Bytes, ImageError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageError::network(format!("Failed to read body: {e}")))?;
        trace!(url = %url, size = bytes.len(), "Received response body");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_creation() {
        assert!(HttpTransport::new(&ImageLoaderConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_error() {
        let transport = HttpTransport::new(&ImageLoaderConfig::default()).unwrap();
        let err = transport.open("not a url").await.unwrap_err();
        assert!(matches!(err, ImageError::Network { .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let config = ImageLoaderConfig {
            connect_timeout_secs: 1,
            timeout_secs: 2,
            ..ImageLoaderConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        // Port 9 (discard) on loopback is closed in test environments.
        let err = transport.open("http://127.0.0.1:9/a.png").await.unwrap_err();
        assert!(matches!(err, ImageError::Network { .. }));
    }
}
