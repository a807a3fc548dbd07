use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dlprelay::config::load_config;
use dlprelay_cli::commands::{ConfigCommand, ListCommand, RelayAllCommand, RelayCommand};
use dlprelay_cli::error::CliResult;
use dlprelay_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dlprelay")]
#[command(about = "dlprelay - Fetch a file and relay it to an upload endpoint, object store or webhook")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Relay one file to a destination")]
    Relay(RelayCommand),

    #[clap(about = "Relay every catalog file to a destination, verifying digests")]
    RelayAll(RelayAllCommand),

    #[clap(about = "List the files in the download catalog")]
    List(ListCommand),

    #[clap(about = "Configuration commands")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    init_logging();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,dlprelay=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let (config, config_path) = load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Relay(cmd) => cmd.execute(&config, format).await,
        Command::RelayAll(cmd) => cmd.execute(&config, format).await,
        Command::List(cmd) => cmd.execute(&config, format).await,
        Command::Config(cmd) => cmd.execute(&config, config_path.as_deref(), format).await,
    }
}
