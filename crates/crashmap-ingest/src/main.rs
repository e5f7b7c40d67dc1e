//! Crashmap Ingest - collision and station loader

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crashmap_common::logging::{init_logging, LogConfig, LogLevel};
use crashmap_ingest::db::{self, DbConfig};
use crashmap_ingest::pipeline::{http_client, HttpPageFetcher, RunSummary};
use crashmap_ingest::stations::{load_stations, StationSnapshotFetcher};
use crashmap_ingest::{IngestConfig, IngestionCoordinator, StatsAccumulator, StoreWriter};
use sqlx::PgPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "crashmap-ingest")]
#[command(author, version, about = "NYC collision and bike station loader")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Only fetch incidents in this borough (stats only)
    #[arg(short, long, global = true)]
    borough: Option<String>,

    /// Number of concurrent workers [env: CRASHMAP_WORKERS]
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Records per page [env: CRASHMAP_PAGE_SIZE]
    #[arg(long, global = true)]
    page_size: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every incident into the database
    LoadIncidents,

    /// Load the bike station snapshot into the database
    LoadStations,

    /// Print injury and fatality totals without touching the database
    Stats,

    /// Create the tables if they do not exist
    InitSchema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::default()
        .with_level(log_level)
        .with_file_prefix("crashmap-ingest")
        .with_env_overrides()?;
    let _guard = init_logging(&log_config)?;

    if matches!(cli.command, Command::LoadIncidents) && cli.borough.is_some() {
        anyhow::bail!("--borough cannot be used with load-incidents; a load always covers every borough");
    }

    let config = IngestConfig::from_env()?.with_overrides(cli.workers, cli.page_size);
    config.validate()?;

    match cli.command {
        Command::Stats => {
            let cancel = cancel_on_ctrl_c();
            let coordinator = incident_coordinator(&config, cli.borough.clone())?;
            let sink = Arc::new(StatsAccumulator::new(cli.borough.clone()));

            let summary = coordinator.run(sink.clone(), cancel).await?;
            report_run(&summary);

            println!("{}", sink.report());
        },
        Command::LoadIncidents => {
            let pool = connect().await?;
            let cancel = cancel_on_ctrl_c();
            let coordinator = incident_coordinator(&config, None)?;
            let sink = Arc::new(StoreWriter::new(pool));

            let summary = coordinator.run(sink, cancel).await?;
            report_run(&summary);
        },
        Command::LoadStations => {
            let pool = connect().await?;
            let client = http_client(config.fetch_timeout())?;
            let fetcher = StationSnapshotFetcher::new(client, config.station_url()?);
            let writer = StoreWriter::new(pool);

            let load = load_stations(&fetcher, &writer)
                .await
                .context("Station snapshot load failed")?;
            info!(
                fetched = load.fetched,
                dropped = load.dropped,
                delivered = load.delivered,
                "Station load complete"
            );
        },
        Command::InitSchema => {
            let pool = connect().await?;
            db::provision(&pool).await.context("Failed to provision schema")?;
        },
    }

    info!("Done");
    Ok(())
}

fn incident_coordinator(config: &IngestConfig, borough: Option<String>) -> Result<IngestionCoordinator> {
    let client = http_client(config.fetch_timeout())?;
    let fetcher = HttpPageFetcher::new(client, config.incident_url()?)
        .with_app_token(config.app_token.clone())
        .with_borough(borough);

    Ok(IngestionCoordinator::new(config.pipeline(), Arc::new(fetcher)))
}

async fn connect() -> Result<PgPool> {
    let db_config = DbConfig::from_env().context("Failed to load database configuration")?;
    let pool = db::create_pool(&db_config)
        .await
        .context("Failed to connect to database")?;
    db::health_check(&pool).await.context("Database health check failed")?;
    Ok(pool)
}

/// Token cancelled on the first Ctrl-C. In-flight pages still finish.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight pages");
            token.cancel();
        }
    });
    cancel
}

fn report_run(summary: &RunSummary) {
    for worker in summary.workers.iter().filter(|w| w.exit.is_failure()) {
        warn!(
            worker = worker.worker,
            last_offset = ?worker.last_offset,
            exit = ?worker.exit,
            "Worker failed; its last page range was not loaded"
        );
    }

    info!(
        run_id = %summary.run_id,
        delivered = summary.records_delivered(),
        dropped = summary.records_dropped(),
        failed_workers = summary.failed_workers(),
        "Ingestion run complete"
    );
}
