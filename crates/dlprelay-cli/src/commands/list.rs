use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use dlprelay::catalog::CatalogClient;
use dlprelay::config::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ListCommand {}

impl ListCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let catalog = CatalogClient::from_config(config, config.http.build_client()?)?;
        let entries = catalog.list().await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            }
            OutputFormat::Table => {
                if entries.is_empty() {
                    println!("No files listed at {}", catalog.url());
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Name", "SHA-256"]);

                for entry in &entries {
                    table.add_row([entry.name.as_str(), entry.hash.as_str()]);
                }

                println!("{table}\n");
                println!("Total: {} file(s)", entries.len());
            }
        }

        Ok(())
    }
}
