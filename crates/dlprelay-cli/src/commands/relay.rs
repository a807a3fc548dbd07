use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use dlprelay::catalog::CatalogClient;
use dlprelay::config::Config;
use dlprelay::{DestinationKind, RelayOptions, RelayOrchestrator};

use crate::error::{CliError, CliResult};
use crate::output::{ConsoleStatus, OutputFormat, outcome_json, truncate_string};

#[derive(Parser)]
pub struct RelayCommand {
    #[clap(help = "Source URL, or a file name under source.base_url")]
    pub source: String,

    #[clap(long, short = 't', help = "Destination: local, object-store or webhook")]
    pub to: DestinationKind,

    #[clap(long, help = "Webhook URL for this run (overrides the configured one)")]
    pub webhook_url: Option<String>,

    #[clap(long, help = "Comment posted with a webhook upload")]
    pub comment: Option<String>,

    #[clap(long, help = "File name sent to the negotiation endpoint")]
    pub hint: Option<String>,

    #[clap(long, help = "Webhook authorization token")]
    pub token: Option<String>,

    #[clap(long, help = "Check the download against the catalog's SHA-256")]
    pub verify: bool,
}

impl RelayCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let source = config.source.resolve(&self.source)?;
        let name = source.display_name();

        let client = config.http.build_client()?;
        let orchestrator = RelayOrchestrator::from_config_with_client(config, client.clone())?;

        let mut opts = RelayOptions::default();
        if let Some(url) = &self.webhook_url {
            opts = opts.with_webhook_url(url);
        }
        if let Some(comment) = &self.comment {
            opts = opts.with_comment(comment);
        }
        if let Some(hint) = &self.hint {
            opts = opts.with_negotiation_hint(hint);
        }
        if let Some(token) = &self.token {
            opts = opts.with_token(token);
        }
        if self.verify {
            let catalog = CatalogClient::from_config(config, client)?;
            let hash = catalog
                .expected_hash(&name)
                .await?
                .ok_or_else(|| CliError(format!("'{name}' is not listed in the catalog")))?;
            opts = opts.with_expected_sha256(hash);
        }

        let status = ConsoleStatus::new(&name);
        let outcome = orchestrator.relay(&source, self.to, &opts, &status).await;

        match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome_json(&name, &outcome))?
                );
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Field", "Value"]);

                table.add_row(["File", &name]);
                table.add_row(["Source", source.url().as_str()]);
                table.add_row(["Destination", self.to.as_str()]);
                table.add_row(["Outcome", outcome.label()]);
                table.add_row(["Message", &outcome.summary()]);
                if let Some(body) = outcome.body() {
                    table.add_row(["Response", &truncate_string(&body.to_string(), 120)]);
                }

                println!("{table}");
            }
        }

        if outcome.is_success() {
            Ok(())
        } else {
            Err(CliError::transfers_failed(1, 1))
        }
    }
}
