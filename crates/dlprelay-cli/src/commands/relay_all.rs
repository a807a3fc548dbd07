use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use dlprelay::catalog::{CatalogClient, CatalogEntry};
use dlprelay::config::Config;
use dlprelay::{DestinationKind, RelayError, RelayOptions, RelayOrchestrator, TransferOutcome};

use crate::error::{CliError, CliResult};
use crate::output::{ConsoleStatus, OutputFormat, outcome_json, truncate_string};

#[derive(Parser)]
pub struct RelayAllCommand {
    #[clap(long, short = 't', help = "Destination: local, object-store or webhook")]
    pub to: DestinationKind,

    #[clap(long, help = "Webhook URL for these runs (overrides the configured one)")]
    pub webhook_url: Option<String>,

    #[clap(long, help = "Comment posted with each webhook upload")]
    pub comment: Option<String>,

    #[clap(long, help = "Webhook authorization token")]
    pub token: Option<String>,
}

impl RelayAllCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let results = self.relay_catalog(config).await?;
        if results.is_empty() {
            println!("Catalog at {} lists no files.", config.source.catalog_url);
            return Ok(());
        }

        let failed = results.iter().filter(|(_, o)| !o.is_success()).count();

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = results
                    .iter()
                    .map(|(name, outcome)| outcome_json(name, outcome))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["File", "Outcome", "Message"]);

                for (name, outcome) in &results {
                    table.add_row([
                        name.as_str(),
                        outcome.label(),
                        &truncate_string(&outcome.summary(), 80),
                    ]);
                }

                println!("{table}\n");
                println!(
                    "Relayed {} of {} file(s) to {}",
                    results.len() - failed,
                    results.len(),
                    self.to
                );
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(CliError::transfers_failed(failed, results.len()))
        }
    }

    /// Relay every catalog file in turn, one outcome per entry
    pub async fn relay_catalog(
        &self,
        config: &Config,
    ) -> CliResult<Vec<(String, TransferOutcome)>> {
        let client = config.http.build_client()?;
        let catalog = CatalogClient::from_config(config, client.clone())?;
        let orchestrator = RelayOrchestrator::from_config_with_client(config, client)?;

        let entries = catalog.list().await?;

        // One file at a time; runs never overlap
        let mut results = Vec::with_capacity(entries.len());
        for entry in &entries {
            let outcome = self.relay_entry(config, &orchestrator, entry).await;
            results.push((entry.name.clone(), outcome));
        }
        Ok(results)
    }

    async fn relay_entry(
        &self,
        config: &Config,
        orchestrator: &RelayOrchestrator,
        entry: &CatalogEntry,
    ) -> TransferOutcome {
        let source = match config.source.resolve(&entry.name) {
            Ok(source) => source,
            Err(e) => {
                return TransferOutcome::Failed(RelayError::acquisition(None, e.to_string()));
            }
        };

        let mut opts = RelayOptions::default().with_expected_sha256(&entry.hash);
        if let Some(url) = &self.webhook_url {
            opts = opts.with_webhook_url(url);
        }
        if let Some(comment) = &self.comment {
            opts = opts.with_comment(comment);
        }
        if let Some(token) = &self.token {
            opts = opts.with_token(token);
        }

        let status = ConsoleStatus::new(&entry.name);
        orchestrator.relay(&source, self.to, &opts, &status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.source.base_url = format!("{}/static/downloads/", server.uri());
        config.source.catalog_url = format!("{}/availableFiles", server.uri());
        config.local.upload_url = format!("{}/upload", server.uri());
        config
    }

    fn to_local() -> RelayAllCommand {
        RelayAllCommand {
            to: DestinationKind::LocalServer,
            webhook_url: None,
            comment: None,
            token: None,
        }
    }

    #[tokio::test]
    async fn test_unresolvable_entry_does_not_stop_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/availableFiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "..": {"hash": "00"},
                "hello.txt": {"hash": HELLO_SHA256}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/static/downloads/hello.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let results = to_local().relay_catalog(&config_for(&server)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "..");
        assert_eq!(results[0].1.label(), "AcquisitionFailed");
        assert_eq!(results[1].0, "hello.txt");
        assert!(results[1].1.is_success(), "unexpected outcome: {:?}", results[1].1);
    }

    #[tokio::test]
    async fn test_empty_catalog_relays_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/availableFiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let results = to_local().relay_catalog(&config_for(&server)).await.unwrap();
        assert!(results.is_empty());
    }
}
