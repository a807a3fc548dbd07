//! Status reporting capability
//!
//! The orchestrator writes short human-readable progress lines to a
//! [`StatusSink`] and never reads anything back from it.

/// Receiver of progress and outcome text
pub trait StatusSink: Send + Sync {
    fn write(&self, text: &str);
}

impl<F> StatusSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write(&self, text: &str) {
        self(text)
    }
}

/// Status sink that forwards every line to `tracing` at info level
#[derive(Debug, Clone, Default)]
pub struct TracingStatus {
    label: Option<String>,
}

impl TracingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every line with a file name or other label
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl StatusSink for TracingStatus {
    fn write(&self, text: &str) {
        match &self.label {
            Some(label) => tracing::info!(target: "dlprelay::status", file = %label, "{text}"),
            None => tracing::info!(target: "dlprelay::status", "{text}"),
        }
    }
}
