use std::fmt;

/// Error reported by `main` as `Error: <message>` with exit status 1
#[derive(Debug)]
pub struct CliError(pub String);

impl CliError {
    /// Some relay runs ended in a failed outcome
    pub fn transfers_failed(failed: usize, total: usize) -> Self {
        if total == 1 {
            CliError("transfer failed".to_string())
        } else {
            CliError(format!("{failed} of {total} transfers failed"))
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliError {}

impl From<dlprelay::DlpRelayError> for CliError {
    fn from(e: dlprelay::DlpRelayError) -> Self {
        CliError(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError(format!("JSON error: {e}"))
    }
}

pub type CliResult<T> = Result<T, CliError>;
