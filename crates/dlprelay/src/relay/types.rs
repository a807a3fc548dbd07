//! Relay pipeline types
//!
//! Defines the values that flow through a relay run: the source to fetch,
//! the acquired payload, the destination kind, the negotiated upload target,
//! and the terminal outcome with its failure taxonomy.

use bytes::Bytes;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{DlpRelayError, Result};

/// Content type used when the source response does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Display name used when the source URL has no usable final path segment
pub const FALLBACK_FILE_NAME: &str = "downloaded_file";

/// A fully acquired file: bytes, content type and display name
///
/// Not `Clone`: a payload is owned by the run that acquired it until a
/// transmitter consumes it.
pub struct FilePayload {
    bytes: Bytes,
    content_type: String,
    name: String,
}

impl FilePayload {
    pub fn new(
        bytes: impl Into<Bytes>,
        content_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            name: name.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex SHA-256 of the payload bytes
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    /// Split into (bytes, content type, display name)
    pub fn into_parts(self) -> (Bytes, String, String) {
        (self.bytes, self.content_type, self.name)
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Resolvable identifier of the file to relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    url: Url,
}

impl SourceDescriptor {
    /// Parse an absolute http(s) URL
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| DlpRelayError::Config(format!("Invalid source URL '{input}': {e}")))?;
        Self::from_url(url)
    }

    /// Resolve `input` as an absolute URL, or as a name relative to `base`
    ///
    /// A bare file name such as `report.pdf` becomes `<base>/report.pdf`. The
    /// name is percent-encoded as a single path segment, so `:`, `#`, `?` and
    /// `/` stay part of the file name.
    pub fn resolve(input: &str, base: &Url) -> Result<Self> {
        if input.contains("://") {
            return Self::parse(input);
        }
        if input.is_empty() || input == "." || input == ".." {
            return Err(DlpRelayError::Config(format!(
                "Invalid source file name '{input}'"
            )));
        }

        let segment = urlencoding::encode(input);
        let joined = base.join(&segment).map_err(|e| {
            DlpRelayError::Config(format!("Cannot resolve '{input}' against {base}: {e}"))
        })?;
        Self::from_url(joined)
    }

    pub fn from_url(url: Url) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => Ok(Self { url }),
            other => Err(DlpRelayError::Config(format!(
                "Unsupported source scheme '{other}': only http and https are allowed"
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Last non-empty path segment, percent-decoded
    pub fn display_name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| segment.to_string())
            })
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Which sink a relay run delivers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    /// Fixed multipart upload endpoint
    LocalServer,
    /// Object store behind a negotiated pre-signed target
    ObjectStorePresigned,
    /// Caller-supplied messaging webhook
    WebhookMultipart,
}

impl DestinationKind {
    pub const ALL: [DestinationKind; 3] = [
        DestinationKind::LocalServer,
        DestinationKind::ObjectStorePresigned,
        DestinationKind::WebhookMultipart,
    ];

    /// Whether a pre-authorized target must be negotiated before transmitting
    pub fn requires_negotiation(&self) -> bool {
        matches!(self, DestinationKind::ObjectStorePresigned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::LocalServer => "local",
            DestinationKind::ObjectStorePresigned => "object-store",
            DestinationKind::WebhookMultipart => "webhook",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DestinationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "local-server" | "http" => Ok(DestinationKind::LocalServer),
            "object-store" | "objectstore" | "s3" | "presigned" => {
                Ok(DestinationKind::ObjectStorePresigned)
            }
            "webhook" | "slack" => Ok(DestinationKind::WebhookMultipart),
            other => Err(format!(
                "unknown destination '{other}' (expected local, object-store or webhook)"
            )),
        }
    }
}

/// Request shape used for an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMethod {
    /// Raw bytes in the request body
    Put,
    /// Multipart form body
    Post,
}

/// Where and how a payload is to be transmitted
///
/// Produced by negotiation (object store) or from a fixed/caller-supplied URL
/// (local server, webhook). Not `Clone`: a transmitter consumes it, so one
/// target can never serve two runs.
#[derive(Debug, PartialEq)]
pub struct NegotiatedTarget {
    url: Url,
    method: UploadMethod,
    fields: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
}

impl NegotiatedTarget {
    /// A multipart POST target with no auxiliary fields
    pub fn fixed(url: Url) -> Self {
        Self {
            url,
            method: UploadMethod::Post,
            fields: BTreeMap::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn new(
        url: Url,
        method: UploadMethod,
        fields: BTreeMap<String, String>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            url,
            method,
            fields,
            headers,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> UploadMethod {
        self.method
    }

    /// Auxiliary form fields to send verbatim alongside the file
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Headers to send verbatim with a PUT upload
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Caller-supplied per-run options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOptions {
    /// Webhook URL (overrides the configured one)
    pub webhook_url: Option<String>,
    /// `initial_comment` sent with a webhook upload
    pub comment: Option<String>,
    /// Filename hint for negotiation (defaults to the payload name)
    pub negotiation_hint: Option<String>,
    /// Webhook authorization field (overrides the configured one)
    pub token: Option<String>,
    /// Expected SHA-256 of the acquired bytes, hex
    pub expected_sha256: Option<String>,
}

impl RelayOptions {
    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_negotiation_hint(mut self, hint: impl Into<String>) -> Self {
        self.negotiation_hint = Some(hint.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_expected_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into());
        self
    }
}

/// Pipeline stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquisition,
    Negotiation,
    Transmission,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Acquisition => "acquisition",
            Stage::Negotiation => "negotiation",
            Stage::Transmission => "transmission",
        };
        f.write_str(name)
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "no response".to_string(),
    }
}

/// Relay failure taxonomy
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    #[error("Acquisition failed ({}): {reason}", status_label(.status))]
    Acquisition { status: Option<u16>, reason: String },

    #[error("Negotiation failed ({}): {reason}", status_label(.status))]
    Negotiation { status: Option<u16>, reason: String },

    #[error("Transmission failed ({}): {reason}", status_label(.status))]
    Transmission { status: Option<u16>, reason: String },

    /// The peer answered successfully at the HTTP level but broke its contract
    #[error("Protocol violation during {stage}: {reason}")]
    ProtocolViolation {
        stage: Stage,
        status: Option<u16>,
        reason: String,
        body: Option<Value>,
    },
}

impl RelayError {
    pub fn acquisition(status: Option<u16>, reason: impl Into<String>) -> Self {
        RelayError::Acquisition {
            status,
            reason: reason.into(),
        }
    }

    pub fn negotiation(status: Option<u16>, reason: impl Into<String>) -> Self {
        RelayError::Negotiation {
            status,
            reason: reason.into(),
        }
    }

    pub fn transmission(status: Option<u16>, reason: impl Into<String>) -> Self {
        RelayError::Transmission {
            status,
            reason: reason.into(),
        }
    }

    pub fn protocol(
        stage: Stage,
        status: Option<u16>,
        reason: impl Into<String>,
        body: Option<Value>,
    ) -> Self {
        RelayError::ProtocolViolation {
            stage,
            status,
            reason: reason.into(),
            body,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            RelayError::Acquisition { .. } => Stage::Acquisition,
            RelayError::Negotiation { .. } => Stage::Negotiation,
            RelayError::Transmission { .. } => Stage::Transmission,
            RelayError::ProtocolViolation { stage, .. } => *stage,
        }
    }

    /// HTTP status code of the offending response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::Acquisition { status, .. }
            | RelayError::Negotiation { status, .. }
            | RelayError::Transmission { status, .. }
            | RelayError::ProtocolViolation { status, .. } => *status,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Acquisition { .. } => "AcquisitionFailed",
            RelayError::Negotiation { .. } => "NegotiationFailed",
            RelayError::Transmission { .. } => "TransmissionFailed",
            RelayError::ProtocolViolation { .. } => "ProtocolViolation",
        }
    }
}

/// Terminal state of a relay run
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// The sink accepted the payload; `body` is its decoded JSON reply, if any
    Success { body: Option<Value> },
    Failed(RelayError),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&RelayError> {
        match self {
            TransferOutcome::Success { .. } => None,
            TransferOutcome::Failed(err) => Some(err),
        }
    }

    /// Decoded response body, from either a success or a protocol violation
    pub fn body(&self) -> Option<&Value> {
        match self {
            TransferOutcome::Success { body } => body.as_ref(),
            TransferOutcome::Failed(RelayError::ProtocolViolation { body, .. }) => body.as_ref(),
            TransferOutcome::Failed(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Success { .. } => "Success",
            TransferOutcome::Failed(err) => err.kind(),
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self {
            TransferOutcome::Success { .. } => "File uploaded successfully".to_string(),
            TransferOutcome::Failed(err) => err.to_string(),
        }
    }
}

impl From<std::result::Result<Option<Value>, RelayError>> for TransferOutcome {
    fn from(result: std::result::Result<Option<Value>, RelayError>) -> Self {
        match result {
            Ok(body) => TransferOutcome::Success { body },
            Err(err) => TransferOutcome::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:8080/static/downloads/").unwrap()
    }

    #[test]
    fn test_payload_digest_and_debug() {
        let payload = FilePayload::new(&b"hello"[..], "text/plain", "hello.txt");
        assert_eq!(
            payload.sha256_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(payload.len(), 5);
        assert!(!payload.is_empty());

        let debug = format!("{payload:?}");
        assert!(debug.contains("hello.txt"));
        assert!(debug.contains("len: 5"));
    }

    #[test]
    fn test_resolve_bare_name_against_base() {
        let source = SourceDescriptor::resolve("report.pdf", &base()).unwrap();
        assert_eq!(
            source.url().as_str(),
            "http://localhost:8080/static/downloads/report.pdf"
        );
        assert_eq!(source.display_name(), "report.pdf");
    }

    #[test]
    fn test_resolve_keeps_absolute_url() {
        let source = SourceDescriptor::resolve("https://files.example.com/a/b.zip", &base()).unwrap();
        assert_eq!(source.url().host_str(), Some("files.example.com"));
        assert_eq!(source.display_name(), "b.zip");
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = SourceDescriptor::parse("ftp://example.com/file.txt").unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn test_resolve_encodes_name_as_one_segment() {
        let source = SourceDescriptor::resolve("a:b.txt", &base()).unwrap();
        assert_eq!(
            source.url().as_str(),
            "http://localhost:8080/static/downloads/a%3Ab.txt"
        );
        assert_eq!(source.display_name(), "a:b.txt");

        let source = SourceDescriptor::resolve("file#1.txt", &base()).unwrap();
        assert_eq!(source.url().fragment(), None);
        assert_eq!(source.display_name(), "file#1.txt");

        let source = SourceDescriptor::resolve("what?.txt", &base()).unwrap();
        assert_eq!(source.url().query(), None);
        assert_eq!(source.display_name(), "what?.txt");

        let source = SourceDescriptor::resolve("quarterly report.pdf", &base()).unwrap();
        assert_eq!(
            source.url().as_str(),
            "http://localhost:8080/static/downloads/quarterly%20report.pdf"
        );
    }

    #[test]
    fn test_resolve_rejects_dot_segments() {
        assert!(SourceDescriptor::resolve("..", &base()).is_err());
        assert!(SourceDescriptor::resolve(".", &base()).is_err());
        assert!(SourceDescriptor::resolve("", &base()).is_err());
    }

    #[test]
    fn test_resolve_rejects_other_schemes() {
        let err = SourceDescriptor::resolve("ftp://example.com/file.txt", &base()).unwrap_err();
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn test_display_name_is_percent_decoded() {
        let source = SourceDescriptor::parse("http://host/dl/quarterly%20report.pdf").unwrap();
        assert_eq!(source.display_name(), "quarterly report.pdf");
    }

    #[test]
    fn test_display_name_falls_back() {
        let source = SourceDescriptor::parse("http://host/").unwrap();
        assert_eq!(source.display_name(), FALLBACK_FILE_NAME);

        let source = SourceDescriptor::parse("http://host/dir/").unwrap();
        assert_eq!(source.display_name(), "dir");
    }

    #[test]
    fn test_destination_kind_parsing() {
        assert_eq!(
            "local".parse::<DestinationKind>().unwrap(),
            DestinationKind::LocalServer
        );
        assert_eq!(
            "S3".parse::<DestinationKind>().unwrap(),
            DestinationKind::ObjectStorePresigned
        );
        assert_eq!(
            "slack".parse::<DestinationKind>().unwrap(),
            DestinationKind::WebhookMultipart
        );
        assert!("ftp".parse::<DestinationKind>().is_err());

        for kind in DestinationKind::ALL {
            assert_eq!(kind.as_str().parse::<DestinationKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_only_object_store_negotiates() {
        assert!(DestinationKind::ObjectStorePresigned.requires_negotiation());
        assert!(!DestinationKind::LocalServer.requires_negotiation());
        assert!(!DestinationKind::WebhookMultipart.requires_negotiation());
    }

    #[test]
    fn test_relay_error_display_includes_status() {
        let err = RelayError::acquisition(Some(404), "404 Not Found");
        assert_eq!(
            err.to_string(),
            "Acquisition failed (status 404): 404 Not Found"
        );
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.stage(), Stage::Acquisition);
        assert_eq!(err.kind(), "AcquisitionFailed");

        let err = RelayError::negotiation(None, "connection refused");
        assert_eq!(
            err.to_string(),
            "Negotiation failed (no response): connection refused"
        );
    }

    #[test]
    fn test_outcome_body_from_protocol_violation() {
        let body = serde_json::json!({"ok": false, "error": "invalid_auth"});
        let outcome = TransferOutcome::Failed(RelayError::protocol(
            Stage::Transmission,
            Some(200),
            "invalid_auth",
            Some(body.clone()),
        ));
        assert!(!outcome.is_success());
        assert_eq!(outcome.body(), Some(&body));
        assert_eq!(outcome.label(), "ProtocolViolation");
        assert_eq!(outcome.error().map(|e| e.stage()), Some(Stage::Transmission));
        assert_eq!(outcome.error().and_then(|e| e.status()), Some(200));
    }

    #[test]
    fn test_outcome_from_result() {
        let outcome: TransferOutcome = Ok(Some(serde_json::json!({"saved": true}))).into();
        assert!(outcome.is_success());
        assert_eq!(outcome.label(), "Success");
        assert_eq!(outcome.body(), Some(&serde_json::json!({"saved": true})));

        let outcome: TransferOutcome = Err(RelayError::transmission(Some(500), "boom")).into();
        assert_eq!(outcome.label(), "TransmissionFailed");
        assert!(outcome.body().is_none());
    }
}
