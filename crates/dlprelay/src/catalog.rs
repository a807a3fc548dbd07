//! Available-files catalog client
//!
//! The download server publishes the files it serves together with their
//! SHA-256 digests. The catalog drives `relay-all` and supplies expected
//! digests for integrity checks.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::error::{DlpRelayError, Result};

/// One file published by the download server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub name: String,
    /// Lowercase hex SHA-256 of the file
    pub hash: String,
}

/// Client for the server's available-files listing
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    url: Url,
}

impl CatalogClient {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn from_config(config: &Config, client: Client) -> Result<Self> {
        let url = Url::parse(&config.source.catalog_url).map_err(|e| {
            DlpRelayError::Config(format!(
                "Invalid catalog URL '{}': {e}",
                config.source.catalog_url
            ))
        })?;
        Ok(Self::new(client, url))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the catalog, ordered by file name
    pub async fn list(&self) -> Result<Vec<CatalogEntry>> {
        debug!("GET {}", self.url);

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| DlpRelayError::Catalog(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DlpRelayError::Catalog(format!(
                "API returned {status}: {}",
                error_text.trim()
            )));
        }

        let listing: BTreeMap<String, CatalogEntry> = response
            .json()
            .await
            .map_err(|e| DlpRelayError::Catalog(format!("invalid catalog JSON: {e}")))?;

        let mut entries: Vec<CatalogEntry> = listing
            .into_iter()
            .map(|(key, mut entry)| {
                if entry.name.is_empty() {
                    entry.name = key;
                }
                entry
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        info!("Catalog lists {} file(s)", entries.len());
        Ok(entries)
    }

    /// Expected digest for `name`, if the catalog lists it
    pub async fn expected_hash(&self, name: &str) -> Result<Option<String>> {
        let entries = self.list().await?;
        Ok(entries
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.hash))
    }
}
