//! Destination transmitters
//!
//! One transmitter per sink protocol. Each shapes the outgoing request the
//! way its sink expects and interprets the sink's reply, reclassifying
//! transport errors as [`RelayError::Transmission`].

mod local;
mod object_store;
mod webhook;

pub use local::LocalServerTransmitter;
pub use object_store::{PresignedPostTransmitter, PresignedPutTransmitter};
pub use webhook::{WebhookTransmitter, is_truthy};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::Part;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::relay::types::{FilePayload, NegotiatedTarget, RelayError};

/// Multipart field carrying the file bytes
pub const FILE_FIELD: &str = "file";

/// Longest slice of an error body quoted in a failure reason
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Sends an acquired payload to one kind of sink
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Consume the payload and target, returning the sink's decoded reply
    ///
    /// `extra` carries caller-supplied form fields (comment, token, ...).
    async fn send(
        &self,
        payload: FilePayload,
        target: NegotiatedTarget,
        extra: &BTreeMap<String, String>,
    ) -> Result<Option<Value>, RelayError>;

    /// Transmitter name for logging
    fn name(&self) -> &'static str;
}

/// Build the `file` part: bytes, display name and content type
pub(crate) fn file_part(payload: FilePayload) -> Part {
    let (bytes, content_type, name) = payload.into_parts();
    let len = bytes.len() as u64;
    let part = Part::stream_with_length(bytes.clone(), len).file_name(name.clone());

    match part.mime_str(&content_type) {
        Ok(part) => part,
        Err(e) => {
            warn!("Ignoring unparseable content type '{}': {}", content_type, e);
            Part::stream_with_length(bytes, len).file_name(name)
        }
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> RelayError {
    RelayError::transmission(e.status().map(|s| s.as_u16()), format!("request failed: {e}"))
}

/// Read the full reply, mapping body read errors to transmission failures
pub(crate) async fn read_reply(response: Response) -> Result<(StatusCode, Bytes), RelayError> {
    let status = response.status();
    let body = response.bytes().await.map_err(|e| {
        RelayError::transmission(Some(status.as_u16()), format!("reading reply failed: {e}"))
    })?;
    Ok((status, body))
}

/// Fail with the status and a quoted slice of the body unless the status is 2xx
pub(crate) fn ensure_success(status: StatusCode, body: &[u8], action: &str) -> Result<(), RelayError> {
    if status.is_success() {
        return Ok(());
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let reason = if text.is_empty() {
        format!("{action} failed: {status}")
    } else {
        let quoted: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{action} failed: {status}: {quoted}")
    };
    Err(RelayError::transmission(Some(status.as_u16()), reason))
}

/// Decode a JSON reply; empty or non-JSON bodies yield `None`
pub(crate) fn decode_json_body(body: &[u8]) -> Option<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    serde_json::from_slice(body).ok()
}
