//! Image catalog client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::errors::ImageError;

/// One record of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Record identifier.
    pub id: u64,
    /// Image location.
    #[serde(rename = "imageUrl")]
    pub url: String,
}

/// Parses a JSON catalog body.
///
/// # Errors
/// Returns [`ImageError::Decode`] if the body is not a list of records.
pub fn parse_catalog(body: &[u8]) -> Result<Vec<CatalogItem>, ImageError> {
    serde_json::from_slice(body)
        .map_err(|e| ImageError::decode(format!("failed to parse catalog: {e}")))
}

/// Fetches the list of images to display.
pub struct CatalogClient {
    client: Client,
    url: String,
}

impl CatalogClient {
    /// Creates a client for the catalog at `url`.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ImageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageError::network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Catalog location.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Downloads and parses the catalog.
    ///
    /// # Errors
    /// Returns [`ImageError::Network`] on transport failure or a non-2xx
    /// status and [`ImageError::Decode`] on a malformed body.
    pub async fn fetch(&self) -> Result<Vec<CatalogItem>, ImageError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            warn!(url = %self.url, error = %e, "Failed to reach catalog");
            if e.is_timeout() {
                ImageError::network("request timed out")
            } else {
                ImageError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::network(format!("catalog returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ImageError::network(format!("failed to read catalog: {e}")))?;
        let items = parse_catalog(&body)?;
        debug!(url = %self.url, count = items.len(), "Fetched catalog");
        Ok(items)
    }
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
