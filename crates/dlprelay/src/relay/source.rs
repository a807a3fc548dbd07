//! Byte acquisition from the source URL

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use crate::relay::types::{DEFAULT_CONTENT_TYPE, FilePayload, RelayError, SourceDescriptor};

/// Acquires the full content of a remote resource
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Fetch the resource in one round trip and materialize it in memory
    async fn acquire(&self, source: &SourceDescriptor) -> Result<FilePayload, RelayError>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// Plain HTTP GET byte source
#[derive(Debug, Clone)]
pub struct HttpByteSource {
    client: Client,
}

impl HttpByteSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn acquire(&self, source: &SourceDescriptor) -> Result<FilePayload, RelayError> {
        debug!("GET {}", source);

        let response = self
            .client
            .get(source.url().clone())
            .send()
            .await
            .map_err(|e| RelayError::acquisition(None, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::acquisition(
                Some(status.as_u16()),
                format!("HTTP error! status: {status}"),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let bytes = response.bytes().await.map_err(|e| {
            RelayError::acquisition(Some(status.as_u16()), format!("reading body failed: {e}"))
        })?;

        let name = source.display_name();
        info!("Downloaded {} ({} bytes, {})", name, bytes.len(), content_type);

        Ok(FilePayload::new(bytes, content_type, name))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
