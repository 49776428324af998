use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flight_analytics::app::commands;
use flight_analytics::{pipelines, Config};

#[derive(Parser)]
#[command(name = "flight-analytics")]
#[command(about = "Run flight-record aggregation reports and print pipe-delimited rows")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults: $FLIGHT_ANALYTICS_CONFIG, ./config.toml, user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate against a JSON array of flight records instead of MongoDB
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Airline market share and cancellation/diversion rates
    MarketShare,
    /// Delayed flights by airline, year and primary delay cause
    DelayCauses,
    /// Arrival delay by destination, month and scheduled arrival hour
    HourlyArrivalDelay,
    /// Arrival delay by destination and day for the configured month
    DailyArrivalDelay,
    /// Volume and average arrival delay per airline and airport in the configured state
    CaliforniaDelays,
    /// List available reports
    List,
}

impl Commands {
    fn report_name(&self) -> Option<&'static str> {
        match self {
            Commands::MarketShare => Some("market-share"),
            Commands::DelayCauses => Some("delay-causes"),
            Commands::HourlyArrivalDelay => Some("hourly-arrival-delay"),
            Commands::DailyArrivalDelay => Some("daily-arrival-delay"),
            Commands::CaliforniaDelays => Some("california-delays"),
            Commands::List => None,
        }
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let report_name = match cli.command.report_name() {
        Some(name) => name,
        None => {
            commands::list_reports(&mut io::stdout().lock())?;
            return Ok(());
        }
    };

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging.level);

    let report = pipelines::find(report_name)
        .with_context(|| format!("Unknown report: {}", report_name))?;

    let store = commands::open_store(&config, cli.fixture.as_deref())
        .await
        .context("Failed to open flight records")?;

    commands::run_report(&store, report, &config.reports, &mut io::stdout().lock())
        .await
        .with_context(|| format!("Report {} failed", report.name))?;

    Ok(())
}
