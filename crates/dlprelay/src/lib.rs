//! dlprelay - Client-side file relay
//!
//! Fetches a file over HTTP and forwards its bytes to exactly one sink: a
//! local multipart upload endpoint, an object store behind a pre-signed URL,
//! or a messaging-platform webhook.

pub mod catalog;
pub mod config;
pub mod error;
pub mod relay;
pub mod testing;

pub use error::DlpRelayError;
pub use relay::{
    DestinationKind, FilePayload, RelayError, RelayOptions, RelayOrchestrator, SourceDescriptor,
    StatusSink, TransferOutcome,
};
