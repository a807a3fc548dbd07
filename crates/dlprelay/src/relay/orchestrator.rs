//! Relay orchestration
//!
//! Drives one relay run through its stages:
//!
//! ```text
//! Idle -> Acquiring -> [Negotiating] -> Transmitting -> Done(outcome)
//! ```
//!
//! Negotiation only happens for destinations that need a pre-authorized
//! target. Any stage failure ends the run immediately; nothing is retried.
//! Runs share no mutable state, so independent runs may overlap freely.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::{Instrument, info_span, warn};
use url::Url;

use crate::config::{Config, PresignedMethod};
use crate::error::{DlpRelayError, Result};
use crate::relay::negotiator::{HttpNegotiator, SinkNegotiator};
use crate::relay::source::{ByteSource, HttpByteSource};
use crate::relay::status::StatusSink;
use crate::relay::transmitters::{
    LocalServerTransmitter, PresignedPostTransmitter, PresignedPutTransmitter, Transmitter,
    WebhookTransmitter,
};
use crate::relay::types::{
    DestinationKind, FilePayload, NegotiatedTarget, RelayError, RelayOptions, SourceDescriptor,
    TransferOutcome, UploadMethod,
};

/// Webhook field carrying the caller's comment
pub const COMMENT_FIELD: &str = "initial_comment";
/// Webhook authorization field
pub const TOKEN_FIELD: &str = "token";
/// Webhook channel selection field
pub const CHANNELS_FIELD: &str = "channels";

/// The pipeline stages an orchestrator dispatches to
#[derive(Clone)]
pub struct RelayComponents {
    pub source: Arc<dyn ByteSource>,
    pub negotiator: Arc<dyn SinkNegotiator>,
    pub local: Arc<dyn Transmitter>,
    pub presigned_put: Arc<dyn Transmitter>,
    pub presigned_post: Arc<dyn Transmitter>,
    pub webhook: Arc<dyn Transmitter>,
}

impl RelayComponents {
    /// HTTP implementations of every stage sharing one client
    pub fn http(client: Client, negotiation_endpoint: Url, method: PresignedMethod) -> Self {
        Self {
            source: Arc::new(HttpByteSource::new(client.clone())),
            negotiator: Arc::new(HttpNegotiator::new(
                client.clone(),
                negotiation_endpoint,
                method,
            )),
            local: Arc::new(LocalServerTransmitter::new(client.clone())),
            presigned_put: Arc::new(PresignedPutTransmitter::new(client.clone())),
            presigned_post: Arc::new(PresignedPostTransmitter::new(client.clone())),
            webhook: Arc::new(WebhookTransmitter::new(client)),
        }
    }
}

/// Fixed endpoints and defaults applied to every run
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Fixed local upload endpoint
    pub local_endpoint: Url,
    /// Webhook URL used when a run supplies none
    pub webhook_url: Option<String>,
    /// Webhook token used when a run supplies none
    pub webhook_token: Option<String>,
    /// Webhook `channels` field
    pub webhook_channels: Option<String>,
}

impl RelaySettings {
    pub fn new(local_endpoint: Url) -> Self {
        Self {
            local_endpoint,
            webhook_url: None,
            webhook_token: None,
            webhook_channels: None,
        }
    }
}

fn parse_config_url(value: &str, what: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| DlpRelayError::Config(format!("Invalid {what} '{value}': {e}")))
}

/// Single entry point of the relay pipeline
#[derive(Clone)]
pub struct RelayOrchestrator {
    components: RelayComponents,
    settings: RelaySettings,
}

impl RelayOrchestrator {
    pub fn new(components: RelayComponents, settings: RelaySettings) -> Self {
        Self {
            components,
            settings,
        }
    }

    /// Build an HTTP-backed orchestrator from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = config.http.build_client()?;
        Self::from_config_with_client(config, client)
    }

    pub fn from_config_with_client(config: &Config, client: Client) -> Result<Self> {
        let local_endpoint = parse_config_url(&config.local.upload_url, "local upload URL")?;
        let negotiation_endpoint =
            parse_config_url(&config.object_store.negotiation_url, "negotiation URL")?;

        let components =
            RelayComponents::http(client, negotiation_endpoint, config.object_store.method);
        let settings = RelaySettings {
            local_endpoint,
            webhook_url: config.webhook.resolve_url(),
            webhook_token: config.webhook.resolve_token(),
            webhook_channels: Some(config.webhook.channels.clone()).filter(|c| !c.is_empty()),
        };
        Ok(Self::new(components, settings))
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Relay one file to one destination
    ///
    /// Never fails: every failure is folded into the returned outcome. Progress
    /// and the final outcome text are written to `status`.
    pub async fn relay(
        &self,
        source: &SourceDescriptor,
        kind: DestinationKind,
        opts: &RelayOptions,
        status: &dyn StatusSink,
    ) -> TransferOutcome {
        let span = info_span!("relay", kind = kind.as_str(), source = %source);
        let outcome: TransferOutcome = self
            .run(source, kind, opts, status)
            .instrument(span)
            .await
            .into();

        if let TransferOutcome::Failed(err) = &outcome {
            warn!(kind = kind.as_str(), source = %source, "{}", err);
        }
        status.write(&outcome.summary());
        outcome
    }

    async fn run(
        &self,
        source: &SourceDescriptor,
        kind: DestinationKind,
        opts: &RelayOptions,
        status: &dyn StatusSink,
    ) -> std::result::Result<Option<serde_json::Value>, RelayError> {
        status.write("Downloading file...");
        let payload = self.components.source.acquire(source).await?;
        verify_digest(&payload, opts.expected_sha256.as_deref())?;

        let target = match kind {
            DestinationKind::ObjectStorePresigned => {
                status.write("Requesting upload URL...");
                let hint = opts
                    .negotiation_hint
                    .as_deref()
                    .unwrap_or_else(|| payload.name());
                self.components.negotiator.negotiate(kind, Some(hint)).await?
            }
            DestinationKind::LocalServer => {
                NegotiatedTarget::fixed(self.settings.local_endpoint.clone())
            }
            DestinationKind::WebhookMultipart => NegotiatedTarget::fixed(self.webhook_url(opts)?),
        };

        let transmitter = self.transmitter_for(kind, &target);
        let extra = self.extra_fields(kind, opts);

        status.write(&format!("Uploading file to {kind}..."));
        tracing::debug!(
            "Dispatching {} ({} bytes) to {} transmitter",
            payload.name(),
            payload.len(),
            transmitter.name()
        );
        transmitter.send(payload, target, &extra).await
    }

    fn transmitter_for(&self, kind: DestinationKind, target: &NegotiatedTarget) -> &dyn Transmitter {
        match kind {
            DestinationKind::LocalServer => self.components.local.as_ref(),
            DestinationKind::WebhookMultipart => self.components.webhook.as_ref(),
            DestinationKind::ObjectStorePresigned => match target.method() {
                UploadMethod::Put => self.components.presigned_put.as_ref(),
                UploadMethod::Post => self.components.presigned_post.as_ref(),
            },
        }
    }

    fn webhook_url(&self, opts: &RelayOptions) -> std::result::Result<Url, RelayError> {
        let raw = opts
            .webhook_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.settings.webhook_url.as_deref())
            .ok_or_else(|| RelayError::transmission(None, "no webhook URL configured"))?;

        Url::parse(raw)
            .map_err(|e| RelayError::transmission(None, format!("invalid webhook URL: {e}")))
    }

    fn extra_fields(&self, kind: DestinationKind, opts: &RelayOptions) -> BTreeMap<String, String> {
        let mut extra = BTreeMap::new();
        if kind != DestinationKind::WebhookMultipart {
            return extra;
        }

        if let Some(comment) = opts.comment.as_ref().filter(|c| !c.is_empty()) {
            extra.insert(COMMENT_FIELD.to_string(), comment.clone());
        }
        if let Some(token) = opts
            .token
            .as_ref()
            .or(self.settings.webhook_token.as_ref())
            .filter(|t| !t.is_empty())
        {
            extra.insert(TOKEN_FIELD.to_string(), token.clone());
        }
        if let Some(channels) = &self.settings.webhook_channels {
            extra.insert(CHANNELS_FIELD.to_string(), channels.clone());
        }
        extra
    }
}

fn verify_digest(
    payload: &FilePayload,
    expected: Option<&str>,
) -> std::result::Result<(), RelayError> {
    let Some(expected) = expected.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(());
    };

    let actual = payload.sha256_hex();
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(RelayError::acquisition(
            None,
            format!("sha256 mismatch: expected {expected}, got {actual}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        CountingNegotiator, CountingSource, RecordingStatus, RecordingTransmitter,
    };
    use serde_json::json;

    struct Doubles {
        source: Arc<CountingSource>,
        negotiator: Arc<CountingNegotiator>,
        local: Arc<RecordingTransmitter>,
        put: Arc<RecordingTransmitter>,
        post: Arc<RecordingTransmitter>,
        webhook: Arc<RecordingTransmitter>,
    }

    impl Doubles {
        fn new(source: CountingSource, negotiator: CountingNegotiator) -> Self {
            Self {
                source: Arc::new(source),
                negotiator: Arc::new(negotiator),
                local: Arc::new(RecordingTransmitter::succeeding("local", None)),
                put: Arc::new(RecordingTransmitter::succeeding("put", None)),
                post: Arc::new(RecordingTransmitter::succeeding("post", None)),
                webhook: Arc::new(RecordingTransmitter::succeeding(
                    "webhook",
                    Some(json!({"ok": true})),
                )),
            }
        }

        fn orchestrator(&self) -> RelayOrchestrator {
            let components = RelayComponents {
                source: self.source.clone(),
                negotiator: self.negotiator.clone(),
                local: self.local.clone(),
                presigned_put: self.put.clone(),
                presigned_post: self.post.clone(),
                webhook: self.webhook.clone(),
            };
            let mut settings =
                RelaySettings::new(Url::parse("http://localhost:8080/upload").unwrap());
            settings.webhook_url = Some("https://hooks.example.com/default".to_string());
            RelayOrchestrator::new(components, settings)
        }

        fn transmit_calls(&self) -> usize {
            self.local.calls() + self.put.calls() + self.post.calls() + self.webhook.calls()
        }
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::parse("http://localhost:8080/static/downloads/report.pdf").unwrap()
    }

    #[tokio::test]
    async fn test_local_server_skips_negotiation() {
        let doubles = Doubles::new(
            CountingSource::serving(b"pdf bytes".to_vec(), "application/pdf"),
            CountingNegotiator::put("https://store/x"),
        );
        let status = RecordingStatus::new();

        let outcome = doubles
            .orchestrator()
            .relay(&source(), DestinationKind::LocalServer, &RelayOptions::default(), &status)
            .await;

        assert!(outcome.is_success());
        assert_eq!(doubles.source.calls(), 1);
        assert_eq!(doubles.negotiator.calls(), 0);
        assert_eq!(doubles.local.calls(), 1);
        assert_eq!(doubles.transmit_calls(), 1);

        let sent = doubles.local.last_request().unwrap();
        assert_eq!(sent.url.as_str(), "http://localhost:8080/upload");
        assert_eq!(sent.payload, b"pdf bytes".to_vec());
        assert_eq!(sent.file_name, "report.pdf");
        assert!(sent.extra.is_empty());
    }

    #[tokio::test]
    async fn test_acquisition_failure_stops_pipeline() {
        let doubles = Doubles::new(
            CountingSource::failing(RelayError::acquisition(Some(404), "HTTP error! status: 404")),
            CountingNegotiator::put("https://store/x"),
        );
        let status = RecordingStatus::new();

        for kind in DestinationKind::ALL {
            let outcome = doubles
                .orchestrator()
                .relay(&source(), kind, &RelayOptions::default(), &status)
                .await;
            assert_eq!(outcome.label(), "AcquisitionFailed");
            assert_eq!(outcome.error().and_then(RelayError::status), Some(404));
        }

        assert_eq!(doubles.source.calls(), 3);
        assert_eq!(doubles.negotiator.calls(), 0);
        assert_eq!(doubles.transmit_calls(), 0);

        let lines = status.lines();
        assert_eq!(lines.first().map(String::as_str), Some("Downloading file..."));
        assert!(lines.last().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_object_store_negotiates_before_transmitting() {
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), "k1".to_string());
        fields.insert("policy".to_string(), "p1".to_string());
        fields.insert("signature".to_string(), "s1".to_string());

        let doubles = Doubles::new(
            CountingSource::serving(b"data".to_vec(), "text/plain"),
            CountingNegotiator::post("https://store/x", fields.clone()),
        );
        let status = RecordingStatus::new();

        let outcome = doubles
            .orchestrator()
            .relay(
                &source(),
                DestinationKind::ObjectStorePresigned,
                &RelayOptions::default(),
                &status,
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(doubles.negotiator.calls(), 1);
        assert_eq!(doubles.negotiator.hints(), vec![Some("report.pdf".to_string())]);
        assert_eq!(doubles.post.calls(), 1);
        assert_eq!(doubles.put.calls(), 0);

        let sent = doubles.post.last_request().unwrap();
        assert_eq!(sent.url.as_str(), "https://store/x");
        assert_eq!(sent.fields, fields);

        assert_eq!(
            status.lines(),
            vec![
                "Downloading file...",
                "Requesting upload URL...",
                "Uploading file to object-store...",
                "File uploaded successfully",
            ]
        );
    }

    #[tokio::test]
    async fn test_object_store_put_variant_and_explicit_hint() {
        let doubles = Doubles::new(
            CountingSource::serving(b"data".to_vec(), "text/plain"),
            CountingNegotiator::put("https://store/put-here"),
        );
        let opts = RelayOptions::default().with_negotiation_hint("renamed.txt");

        let outcome = doubles
            .orchestrator()
            .relay(
                &source(),
                DestinationKind::ObjectStorePresigned,
                &opts,
                &RecordingStatus::new(),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(doubles.negotiator.hints(), vec![Some("renamed.txt".to_string())]);
        assert_eq!(doubles.put.calls(), 1);
        assert_eq!(doubles.post.calls(), 0);
    }

    #[tokio::test]
    async fn test_negotiation_failure_prevents_transmission() {
        let doubles = Doubles::new(
            CountingSource::serving(b"data".to_vec(), "text/plain"),
            CountingNegotiator::failing(RelayError::negotiation(Some(500), "server error")),
        );

        let outcome = doubles
            .orchestrator()
            .relay(
                &source(),
                DestinationKind::ObjectStorePresigned,
                &RelayOptions::default(),
                &RecordingStatus::new(),
            )
            .await;

        assert_eq!(outcome.label(), "NegotiationFailed");
        assert_eq!(doubles.negotiator.calls(), 1);
        assert_eq!(doubles.transmit_calls(), 0);
    }

    #[tokio::test]
    async fn test_webhook_extras_and_url_override() {
        let doubles = Doubles::new(
            CountingSource::serving(b"data".to_vec(), "text/plain"),
            CountingNegotiator::put("https://store/x"),
        );
        let opts = RelayOptions::default()
            .with_webhook_url("https://hooks.example.com/override")
            .with_comment("DLP test upload")
            .with_token("xoxb-123");

        let outcome = doubles
            .orchestrator()
            .relay(
                &source(),
                DestinationKind::WebhookMultipart,
                &opts,
                &RecordingStatus::new(),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.body(), Some(&json!({"ok": true})));
        assert_eq!(doubles.negotiator.calls(), 0);

        let sent = doubles.webhook.last_request().unwrap();
        assert_eq!(sent.url.as_str(), "https://hooks.example.com/override");
        assert_eq!(
            sent.extra.get(COMMENT_FIELD).map(String::as_str),
            Some("DLP test upload")
        );
        assert_eq!(sent.extra.get(TOKEN_FIELD).map(String::as_str), Some("xoxb-123"));
    }

    #[tokio::test]
    async fn test_webhook_without_url_fails_transmission() {
        let doubles = Doubles::new(
            CountingSource::serving(b"data".to_vec(), "text/plain"),
            CountingNegotiator::put("https://store/x"),
        );
        let mut orchestrator = doubles.orchestrator();
        orchestrator.settings.webhook_url = None;

        let outcome = orchestrator
            .relay(
                &source(),
                DestinationKind::WebhookMultipart,
                &RelayOptions::default(),
                &RecordingStatus::new(),
            )
            .await;

        assert_eq!(outcome.label(), "TransmissionFailed");
        assert!(outcome.error().unwrap().to_string().contains("no webhook URL"));
        assert_eq!(doubles.webhook.calls(), 0);
    }

    #[tokio::test]
    async fn test_transmitter_failure_is_returned() {
        let doubles = Doubles {
            local: Arc::new(RecordingTransmitter::failing(
                "local",
                RelayError::transmission(Some(401), "File hash mismatch."),
            )),
            ..Doubles::new(
                CountingSource::serving(b"data".to_vec(), "text/plain"),
                CountingNegotiator::put("https://store/x"),
            )
        };
        let status = RecordingStatus::new();

        let outcome = doubles
            .orchestrator()
            .relay(&source(), DestinationKind::LocalServer, &RelayOptions::default(), &status)
            .await;

        assert_eq!(outcome.label(), "TransmissionFailed");
        assert_eq!(outcome.error().and_then(RelayError::status), Some(401));
        assert!(status.lines().last().unwrap().contains("File hash mismatch."));
    }

    #[tokio::test]
    async fn test_digest_verification() {
        let doubles = Doubles::new(
            CountingSource::serving(b"hello".to_vec(), "text/plain"),
            CountingNegotiator::put("https://store/x"),
        );
        let orchestrator = doubles.orchestrator();

        let good = RelayOptions::default().with_expected_sha256(
            "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824",
        );
        let outcome = orchestrator
            .relay(&source(), DestinationKind::LocalServer, &good, &RecordingStatus::new())
            .await;
        assert!(outcome.is_success());

        let bad = RelayOptions::default().with_expected_sha256("deadbeef");
        let outcome = orchestrator
            .relay(&source(), DestinationKind::LocalServer, &bad, &RecordingStatus::new())
            .await;
        assert_eq!(outcome.label(), "AcquisitionFailed");
        assert!(outcome.error().unwrap().to_string().contains("sha256 mismatch"));
        assert_eq!(doubles.local.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeated_relay_is_not_deduplicated() {
        let doubles = Doubles::new(
            CountingSource::serving(b"data".to_vec(), "text/plain"),
            CountingNegotiator::put("https://store/x"),
        );
        let orchestrator = doubles.orchestrator();
        let opts = RelayOptions::default();

        for _ in 0..2 {
            let outcome = orchestrator
                .relay(
                    &source(),
                    DestinationKind::ObjectStorePresigned,
                    &opts,
                    &RecordingStatus::new(),
                )
                .await;
            assert!(outcome.is_success());
        }

        assert_eq!(doubles.source.calls(), 2);
        assert_eq!(doubles.negotiator.calls(), 2);
        assert_eq!(doubles.put.calls(), 2);
    }

    #[test]
    fn test_from_config_rejects_bad_urls() {
        let mut config = Config::default();
        config.local.upload_url = "not a url".to_string();
        let err = RelayOrchestrator::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("local upload URL"));
    }

    #[test]
    fn test_from_config_applies_webhook_settings() {
        let mut config = Config::default();
        config.webhook.url = "https://hooks.example.com/cfg".to_string();
        config.webhook.channels = "C42".to_string();

        let orchestrator = RelayOrchestrator::from_config(&config).unwrap();
        let settings = orchestrator.settings();
        assert_eq!(settings.local_endpoint.as_str(), "http://localhost:8080/upload");
        assert_eq!(
            settings.webhook_url.as_deref(),
            Some("https://hooks.example.com/cfg")
        );
        assert_eq!(settings.webhook_channels.as_deref(), Some("C42"));
    }
}
