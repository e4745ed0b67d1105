//! Standalone scan trigger CLI for the fundsync ingestion pipeline.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fundsync::{IngestService, ProviderSet, ScanRequest, ScanResponse};
use fundsync_store::SqliteStore;

#[derive(Parser)]
#[command(name = "fundsync-collector")]
#[command(about = "Fundsync data collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the SQLite database.
    #[arg(long, default_value = "fundsync.db")]
    db: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one fundamentals scan invocation.
    ScanFundamentals {
        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Run one cash-flow statement scan invocation.
    ScanStatements {
        #[command(flatten)]
        scan: ScanArgs,

        /// Skip the quarterly phase.
        #[arg(long)]
        skip_quarterly: bool,

        /// Skip the annual phase.
        #[arg(long)]
        skip_annual: bool,
    },

    /// Seed the watchlist collaborator table with symbols.
    SeedWatchlist {
        /// Symbols to add, comma-separated (e.g. "AAPL,MSFT").
        symbols: String,
    },
}

#[derive(clap::Args)]
struct ScanArgs {
    /// Explicit symbols, comma-separated; bypasses the freshness partition.
    #[arg(long)]
    symbols: Option<String>,

    /// Cap on symbols processed this invocation.
    #[arg(long)]
    max_symbols: Option<usize>,

    /// Ignore freshness windows and re-fetch everything selected.
    #[arg(long)]
    force_refresh: bool,

    /// Select from the most recently added watchlist entries first.
    #[arg(long)]
    prioritize_recent: bool,
}

impl ScanArgs {
    fn into_request(self) -> ScanRequest {
        ScanRequest {
            symbols: self
                .symbols
                .map(|list| list.split(',').map(|s| s.trim().to_string()).collect()),
            max_symbols: self.max_symbols,
            force_refresh: self.force_refresh,
            prioritize_recent: self.prioritize_recent,
            ..ScanRequest::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fundsync={}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Collector failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> fundsync::Result<ExitCode> {
    let store = Arc::new(SqliteStore::new(&cli.db)?);

    match cli.command {
        Commands::ScanFundamentals { scan } => {
            let service = IngestService::new(ProviderSet::from_env(), store);
            let response = service.scan_fundamentals(&scan.into_request()).await?;
            report(&response)
        }
        Commands::ScanStatements {
            scan,
            skip_quarterly,
            skip_annual,
        } => {
            let service = IngestService::new(ProviderSet::from_env(), store);
            let mut request = scan.into_request();
            request.skip_quarterly = skip_quarterly;
            request.skip_annual = skip_annual;
            let response = service.scan_statements(&request).await?;
            report(&response)
        }
        Commands::SeedWatchlist { symbols } => {
            let entries: Vec<&str> = symbols.split(',').map(str::trim).collect();
            let inserted = store.seed_watchlist(&entries)?;
            tracing::info!(inserted, "Watchlist seeded");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(response: &ScanResponse) -> fundsync::Result<ExitCode> {
    let body = serde_json::to_string_pretty(response)
        .map_err(|e| fundsync::IngestError::Other(e.to_string()))?;
    println!("{body}");

    tracing::info!(
        status = response.http_status(),
        success = response.success,
        "Scan finished"
    );
    Ok(ExitCode::SUCCESS)
}
