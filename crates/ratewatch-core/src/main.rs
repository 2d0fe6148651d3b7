//! RateWatch CLI
//!
//! Command-line interface for the exchange-rate monitor.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use ratewatch::alerting::LogTransport;
use ratewatch::rate::{HttpRateSource, RateSource};
use ratewatch::{Config, RateWatch};

/// RateWatch - exchange-rate alerts for chat groups
#[derive(Parser)]
#[command(name = "ratewatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "RATEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the webhook server
    Serve {
        /// Override the listen port
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },

    /// Fetch the rate once and print it
    Check,

    /// Validate the configuration and list rules with their next due time
    Rules,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Error reading .env: {e}");
            return ExitCode::FAILURE;
        }
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    config.logging.init(cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Check => run_check(&config).await,
        Commands::Rules => run_rules(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    info!(addr = %config.server.addr(), rules = config.schedule.rules.len(), "Starting ratewatch");

    RateWatch::new(config)?.run().await?;
    Ok(())
}

async fn run_check(config: &Config) -> anyhow::Result<()> {
    let source = HttpRateSource::new(&config.provider)?;
    let sample = source.fetch().await?;

    println!("USD/TWD {} (fetched {})", sample.value(), sample.fetched_at().to_rfc3339());
    Ok(())
}

fn run_rules(config: Config) -> anyhow::Result<()> {
    let zone = config.schedule.timezone;
    let rules = config.schedule.rules.clone();
    let source = Arc::new(HttpRateSource::new(&config.provider)?);
    let engine = RateWatch::with_parts(config, source, Arc::new(LogTransport)).engine()?;

    println!("Timezone: {zone}");
    for (rule, timer) in rules.iter().zip(engine.preview()) {
        let next = timer
            .next_fire
            .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
        println!(
            "{:<16} {:<40} next: {next}",
            rule.name,
            serde_json::to_string(&rule.trigger)?
        );
    }
    Ok(())
}
