//! Pre-signed upload target negotiation
//!
//! Object stores accept uploads only at a pre-authorized target. The
//! negotiator asks a side-channel endpoint for that target once per run and
//! validates the answer at the boundary, so a missing URL never turns into a
//! malformed upload later.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use crate::config::PresignedMethod;
use crate::relay::types::{DestinationKind, NegotiatedTarget, RelayError, UploadMethod};

/// Form field name used for a top-level `accessKeyId`
pub const ACCESS_KEY_FIELD: &str = "AWSAccessKeyId";

/// Obtains a pre-authorized upload target
#[async_trait]
pub trait SinkNegotiator: Send + Sync {
    /// Request a single-use target for `kind`, optionally naming the file
    async fn negotiate(
        &self,
        kind: DestinationKind,
        hint: Option<&str>,
    ) -> Result<NegotiatedTarget, RelayError>;

    /// Negotiator name for logging
    fn name(&self) -> &'static str;
}

/// Negotiation endpoint response
#[derive(Debug, Deserialize)]
struct NegotiationResponse {
    #[serde(default, alias = "uploadUrl")]
    url: Option<String>,
    #[serde(default)]
    fields: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    headers: Option<BTreeMap<String, Value>>,
    #[serde(default, rename = "accessKeyId")]
    access_key_id: Option<String>,
}

fn field_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn into_string_map(map: Option<BTreeMap<String, Value>>) -> BTreeMap<String, String> {
    map.unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| field_value(v).map(|v| (k, v)))
        .collect()
}

/// Negotiator backed by an HTTP GET endpoint returning JSON
#[derive(Debug, Clone)]
pub struct HttpNegotiator {
    client: Client,
    endpoint: Url,
    method: PresignedMethod,
}

impl HttpNegotiator {
    pub fn new(client: Client, endpoint: Url, method: PresignedMethod) -> Self {
        Self {
            client,
            endpoint,
            method,
        }
    }

    fn request_url(&self, hint: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(hint) = hint.filter(|h| !h.is_empty()) {
            url.query_pairs_mut().append_pair("filename", hint);
        }
        url
    }

    fn upload_method(&self, fields: &BTreeMap<String, String>) -> UploadMethod {
        match self.method {
            PresignedMethod::Put => UploadMethod::Put,
            PresignedMethod::Post => UploadMethod::Post,
            PresignedMethod::Auto if fields.is_empty() => UploadMethod::Put,
            PresignedMethod::Auto => UploadMethod::Post,
        }
    }

    fn build_target(&self, response: NegotiationResponse) -> Result<NegotiatedTarget, RelayError> {
        let raw_url = response
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RelayError::negotiation(None, "response is missing the target url"))?;

        let url = Url::parse(raw_url.trim()).map_err(|e| {
            RelayError::negotiation(None, format!("invalid target url '{raw_url}': {e}"))
        })?;

        let mut fields = into_string_map(response.fields);
        if let Some(access_key) = response.access_key_id.filter(|k| !k.is_empty()) {
            fields.entry(ACCESS_KEY_FIELD.to_string()).or_insert(access_key);
        }
        let headers = into_string_map(response.headers);
        let method = self.upload_method(&fields);

        Ok(NegotiatedTarget::new(url, method, fields, headers))
    }
}

#[async_trait]
impl SinkNegotiator for HttpNegotiator {
    async fn negotiate(
        &self,
        kind: DestinationKind,
        hint: Option<&str>,
    ) -> Result<NegotiatedTarget, RelayError> {
        if !kind.requires_negotiation() {
            return Err(RelayError::negotiation(
                None,
                format!("destination '{kind}' does not use negotiation"),
            ));
        }

        let url = self.request_url(hint);
        debug!("Requesting upload target from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::negotiation(None, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::negotiation(
                Some(status.as_u16()),
                format!("HTTP error getting presigned URL! status: {status}"),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            RelayError::negotiation(Some(status.as_u16()), format!("reading body failed: {e}"))
        })?;
        let parsed: NegotiationResponse = serde_json::from_slice(&body).map_err(|e| {
            RelayError::negotiation(Some(status.as_u16()), format!("invalid JSON response: {e}"))
        })?;

        let target = self.build_target(parsed)?;
        info!(
            "Negotiated {:?} target at {} with {} field(s)",
            target.method(),
            target.url().host_str().unwrap_or("<no host>"),
            target.fields().len()
        );
        Ok(target)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
