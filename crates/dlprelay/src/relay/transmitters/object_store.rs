use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::Form;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{
    FILE_FIELD, Transmitter, decode_json_body, ensure_success, file_part, read_reply,
    transport_error,
};
use crate::relay::types::{FilePayload, NegotiatedTarget, RelayError};

/// Raw-body PUT to a pre-signed URL
///
/// `Content-Type` comes from the payload; negotiated headers are applied on
/// top, replacing any header of the same name.
#[derive(Debug, Clone)]
pub struct PresignedPutTransmitter {
    client: Client,
}

impl PresignedPutTransmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn put_headers(
    content_type: &str,
    negotiated: &BTreeMap<String, String>,
) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }

    for (name, value) in negotiated {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            RelayError::transmission(None, format!("invalid negotiated header '{name}': {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            RelayError::transmission(None, format!("invalid value for header '{name}': {e}"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl Transmitter for PresignedPutTransmitter {
    async fn send(
        &self,
        payload: FilePayload,
        target: NegotiatedTarget,
        _extra: &BTreeMap<String, String>,
    ) -> Result<Option<Value>, RelayError> {
        let headers = put_headers(payload.content_type(), target.headers())?;
        let (bytes, _, name) = payload.into_parts();

        debug!("PUT {} ({} bytes)", target.url().path(), bytes.len());
        let response = self
            .client
            .put(target.url().clone())
            .headers(headers)
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body, "PUT to object store")?;

        info!("PUT {} to object store ({})", name, status);
        Ok(decode_json_body(&body))
    }

    fn name(&self) -> &'static str {
        "presigned-put"
    }
}

/// Multipart POST to a pre-signed policy URL
///
/// Every negotiated field is sent verbatim, followed by caller extras, with
/// the `file` part last as object stores require.
#[derive(Debug, Clone)]
pub struct PresignedPostTransmitter {
    client: Client,
}

impl PresignedPostTransmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transmitter for PresignedPostTransmitter {
    async fn send(
        &self,
        payload: FilePayload,
        target: NegotiatedTarget,
        extra: &BTreeMap<String, String>,
    ) -> Result<Option<Value>, RelayError> {
        let name = payload.name().to_string();

        let mut form = Form::new();
        for (key, value) in target.fields() {
            form = form.text(key.clone(), value.clone());
        }
        for (key, value) in extra {
            if !target.fields().contains_key(key) {
                form = form.text(key.clone(), value.clone());
            }
        }
        form = form.part(FILE_FIELD, file_part(payload));

        debug!(
            "POST {} (multipart, {} field(s) + file)",
            target.url().path(),
            target.fields().len()
        );
        let response = self
            .client
            .post(target.url().clone())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body, "POST to object store")?;

        info!("POSTed {} to object store ({})", name, status);
        Ok(decode_json_body(&body))
    }

    fn name(&self) -> &'static str {
        "presigned-post"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_headers_negotiated_override_content_type() {
        let mut negotiated = BTreeMap::new();
        negotiated.insert("Content-Type".to_string(), "image/png".to_string());
        negotiated.insert("x-amz-acl".to_string(), "private".to_string());

        let headers = put_headers("application/pdf", &negotiated).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(headers.get("x-amz-acl").unwrap(), "private");
        assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn test_put_headers_rejects_invalid_name() {
        let mut negotiated = BTreeMap::new();
        negotiated.insert("bad header".to_string(), "v".to_string());

        let err = put_headers("text/plain", &negotiated).unwrap_err();
        assert_eq!(err.kind(), "TransmissionFailed");
        assert!(err.to_string().contains("bad header"));
    }
}
