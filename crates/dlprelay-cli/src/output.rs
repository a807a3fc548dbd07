use dlprelay::{StatusSink, TransferOutcome};
use serde_json::{Value, json};

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// JSON form of a relay outcome, as printed by `--json`
pub fn outcome_json(file: &str, outcome: &TransferOutcome) -> Value {
    let mut value = json!({
        "file": file,
        "outcome": outcome.label(),
        "message": outcome.summary(),
    });
    if let Some(err) = outcome.error() {
        value["stage"] = json!(err.stage().to_string());
        value["status"] = json!(err.status());
    }
    if let Some(body) = outcome.body() {
        value["body"] = body.clone();
    }
    value
}

/// Status sink printing `<file>: <status>` lines to stderr
#[derive(Debug, Clone)]
pub struct ConsoleStatus {
    name: String,
}

impl ConsoleStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl StatusSink for ConsoleStatus {
    fn write(&self, text: &str) {
        eprintln!("{}: {}", self.name, text);
    }
}
