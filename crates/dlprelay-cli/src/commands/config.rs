use std::path::Path;

use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use dlprelay::config::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Parser)]
pub enum ConfigSubcommand {
    #[clap(about = "Show the effective configuration")]
    Show,
}

fn section(rows: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Setting", "Value"]);
    for (key, value) in rows {
        table.add_row([*key, value.as_str()]);
    }
    table
}

fn or_unset(value: &str) -> String {
    if value.is_empty() {
        "(unset)".to_string()
    } else {
        value.to_string()
    }
}

fn token_state(set: bool) -> &'static str {
    if set { "set" } else { "not set" }
}

impl ConfigCommand {
    pub async fn execute(
        &self,
        config: &Config,
        config_path: Option<&Path>,
        format: OutputFormat,
    ) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config, config_path, format),
        }
    }

    fn show(config: &Config, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let webhook_url = config.webhook.resolve_url();
        let has_token = config.webhook.resolve_token().is_some();

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "config_file": config_path.map(|p| p.display().to_string()),
                    "config": config,
                    "resolved": {
                        "webhook_url": webhook_url,
                        "webhook_token_set": has_token,
                    }
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                match config_path {
                    Some(path) => println!("Configuration from: {}", path.display()),
                    None => println!("Configuration: (using defaults)"),
                }
                println!("==============================\n");

                println!("[Source]");
                let table = section(&[
                    ("base_url", config.source.base_url.clone()),
                    ("catalog_url", config.source.catalog_url.clone()),
                ]);
                println!("{table}\n");

                println!("[Local]");
                let table = section(&[("upload_url", config.local.upload_url.clone())]);
                println!("{table}\n");

                println!("[Object store]");
                let table = section(&[
                    (
                        "negotiation_url",
                        config.object_store.negotiation_url.clone(),
                    ),
                    ("method", config.object_store.method.as_str().to_string()),
                ]);
                println!("{table}\n");

                println!("[Webhook]");
                let table = section(&[
                    ("url", or_unset(&config.webhook.url)),
                    ("url_env", or_unset(&config.webhook.url_env)),
                    ("token_env", or_unset(&config.webhook.token_env)),
                    ("channels", or_unset(&config.webhook.channels)),
                    (
                        "resolved url",
                        webhook_url.unwrap_or_else(|| "(none)".to_string()),
                    ),
                    ("token", token_state(has_token).to_string()),
                ]);
                println!("{table}\n");

                println!("[HTTP]");
                let timeout = match config.http.timeout_secs {
                    0 => "none".to_string(),
                    secs => format!("{secs}s"),
                };
                let table = section(&[
                    ("timeout", timeout),
                    ("user_agent", config.http.user_agent.clone()),
                ]);
                println!("{table}");
            }
        }

        Ok(())
    }
}
