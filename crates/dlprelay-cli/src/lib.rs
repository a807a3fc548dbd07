pub mod commands;
pub mod error;
pub mod output;

pub use commands::{ConfigCommand, ListCommand, RelayAllCommand, RelayCommand};
pub use error::{CliError, CliResult};
pub use output::{ConsoleStatus, OutputFormat, outcome_json, truncate_string};
