use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::Form;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{
    FILE_FIELD, Transmitter, decode_json_body, ensure_success, file_part, read_reply,
    transport_error,
};
use crate::relay::types::{FilePayload, NegotiatedTarget, RelayError};

/// Multipart upload to the fixed local server endpoint
///
/// The form carries a single `file` field. A JSON reply is decoded and
/// returned; a plain-text or empty reply is still a success.
#[derive(Debug, Clone)]
pub struct LocalServerTransmitter {
    client: Client,
}

impl LocalServerTransmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transmitter for LocalServerTransmitter {
    async fn send(
        &self,
        payload: FilePayload,
        target: NegotiatedTarget,
        _extra: &BTreeMap<String, String>,
    ) -> Result<Option<Value>, RelayError> {
        let name = payload.name().to_string();
        let form = Form::new().part(FILE_FIELD, file_part(payload));

        debug!("POST {} (multipart, file={})", target.url(), name);
        let response = self
            .client
            .post(target.url().clone())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body, "upload")?;

        let decoded = decode_json_body(&body);
        if decoded.is_none() && !body.is_empty() {
            debug!("Non-JSON reply: {}", String::from_utf8_lossy(&body).trim());
        }
        info!("Uploaded {} to local server ({})", name, status);
        Ok(decoded)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
