//! Relay pipeline
//!
//! A relay run moves one file from a source URL to one destination:
//! acquire the bytes, negotiate a target when the destination needs one,
//! then hand the payload to the matching transmitter.

pub mod negotiator;
pub mod orchestrator;
pub mod source;
pub mod status;
pub mod transmitters;
pub mod types;

pub use negotiator::{HttpNegotiator, SinkNegotiator};
pub use orchestrator::{RelayComponents, RelayOrchestrator, RelaySettings};
pub use source::{ByteSource, HttpByteSource};
pub use status::{StatusSink, TracingStatus};
pub use transmitters::{
    LocalServerTransmitter, PresignedPostTransmitter, PresignedPutTransmitter, Transmitter,
    WebhookTransmitter,
};
pub use types::{
    DestinationKind, FilePayload, NegotiatedTarget, RelayError, RelayOptions, SourceDescriptor,
    Stage, TransferOutcome, UploadMethod,
};
