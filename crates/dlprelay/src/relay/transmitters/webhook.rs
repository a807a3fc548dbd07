use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::Form;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::{FILE_FIELD, Transmitter, ensure_success, file_part, read_reply, transport_error};
use crate::relay::types::{FilePayload, NegotiatedTarget, RelayError, Stage};

/// Form field carrying the display name alongside the file
pub const FILENAME_FIELD: &str = "filename";

/// Loose truthiness of a JSON value, as messaging platforms use for `ok`
///
/// `false`, `null`, `0`, `""` and `"false"` are falsy; everything else,
/// including empty objects and arrays, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Multipart POST to a caller-supplied messaging webhook
///
/// Success needs both a 2xx status and a JSON reply whose `ok` is truthy:
/// the platform reports its own failures inside a 200 response.
#[derive(Debug, Clone)]
pub struct WebhookTransmitter {
    client: Client,
}

impl WebhookTransmitter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transmitter for WebhookTransmitter {
    async fn send(
        &self,
        payload: FilePayload,
        target: NegotiatedTarget,
        extra: &BTreeMap<String, String>,
    ) -> Result<Option<Value>, RelayError> {
        let name = payload.name().to_string();

        let mut form = Form::new();
        for (key, value) in target.fields().iter().chain(extra.iter()) {
            form = form.text(key.clone(), value.clone());
        }
        if !extra.contains_key(FILENAME_FIELD) && !target.fields().contains_key(FILENAME_FIELD) {
            form = form.text(FILENAME_FIELD, name.clone());
        }
        form = form.part(FILE_FIELD, file_part(payload));

        debug!(
            "POST webhook {} (fields: {:?})",
            target.url().host_str().unwrap_or("<no host>"),
            extra.keys().collect::<Vec<_>>()
        );
        let response = self
            .client
            .post(target.url().clone())
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let (status, body) = read_reply(response).await?;
        ensure_success(status, &body, "webhook upload")?;

        let reply: Value = serde_json::from_slice(&body).map_err(|e| {
            RelayError::protocol(
                Stage::Transmission,
                Some(status.as_u16()),
                format!("webhook reply is not JSON: {e}"),
                None,
            )
        })?;

        let ok = reply.get("ok").is_some_and(is_truthy);
        if !ok {
            let reason = reply
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("webhook reported ok=false")
                .to_string();
            warn!("Webhook rejected {}: {}", name, reason);
            return Err(RelayError::protocol(
                Stage::Transmission,
                Some(status.as_u16()),
                reason,
                Some(reply),
            ));
        }

        info!("Posted {} to webhook ({})", name, status);
        Ok(Some(reply))
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}
