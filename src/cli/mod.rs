//! CLI argument parsing and command dispatch

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use tsbench_core::{
    Aggregator, BenchConfig, CsvQuerySource, ExactAggregator, Orchestrator, Query, QueryClient,
    ReservoirAggregator, TimescaleClient, TimescaleConfig, EXACT_DEFAULT_CAPACITY,
    RESERVOIR_DEFAULT_SAMPLE_SIZE,
};

#[derive(Parser)]
#[command(name = "tsbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a benchmark over a CSV of queries
    Run(RunArgs),
    /// Smoke-test database connectivity with a single sample query
    Ping(DbArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the input CSV (reads stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Number of workers to use
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Overall timeout in seconds (0 disables the deadline)
    #[arg(short, long, default_value_t = 0)]
    pub timeout: u64,

    /// Metrics aggregation strategy
    #[arg(long, value_enum, default_value_t = MetricsStrategy::Exact)]
    pub metrics: MetricsStrategy,

    /// Retained sample capacity for the exact strategy
    #[arg(long, default_value_t = EXACT_DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Sample size for the reservoir strategy
    #[arg(long, default_value_t = RESERVOIR_DEFAULT_SAMPLE_SIZE)]
    pub sample_size: usize,

    /// Per-query timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub query_timeout: u64,

    #[command(flatten)]
    pub db: DbArgs,
}

#[derive(Args)]
pub struct DbArgs {
    /// Database host
    #[arg(long, env = "TSBENCH_DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// Database port
    #[arg(long, env = "TSBENCH_DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    /// Database user
    #[arg(long, env = "TSBENCH_DB_USER", default_value = "tsbench")]
    pub db_user: String,

    /// Database password
    #[arg(long, env = "TSBENCH_DB_PASSWORD", hide_env_values = true, default_value = "")]
    pub db_password: String,

    /// Database name
    #[arg(long, env = "TSBENCH_DB_NAME", default_value = "homework")]
    pub db_name: String,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricsStrategy {
    /// Retain every sample; loud failure past the declared capacity
    Exact,
    /// Reservoir sampling: bounded memory, approximate median
    Reservoir,
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Ping(args) => ping(args).await,
    }
}

fn connect(db: &DbArgs, pool_size: usize, query_timeout: Duration) -> Result<Arc<TimescaleClient>> {
    let client = TimescaleClient::connect(&TimescaleConfig {
        user: db.db_user.clone(),
        password: db.db_password.clone(),
        host: db.db_host.clone(),
        port: db.db_port,
        dbname: db.db_name.clone(),
        pool_size,
        query_timeout,
    })
    .context("failed to build database client")?;

    Ok(Arc::new(client))
}

async fn run(args: RunArgs) -> Result<()> {
    let input: Box<dyn Read + Send> = match &args.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        ),
        None => {
            tracing::info!("no input path given, reading from stdin");
            Box::new(io::stdin())
        }
    };
    let source = CsvQuerySource::new(input).context("failed to read CSV header")?;

    let client = connect(&args.db, args.workers, Duration::from_secs(args.query_timeout))?;
    client.ping().await.context("database is not reachable")?;

    let aggregator: Box<dyn Aggregator> = match args.metrics {
        MetricsStrategy::Exact => Box::new(ExactAggregator::with_capacity(args.capacity)?),
        MetricsStrategy::Reservoir => Box::new(ReservoirAggregator::from_entropy(args.sample_size)?),
    };

    let mut config = BenchConfig::new(args.workers);
    if args.timeout > 0 {
        config = config.with_deadline(Duration::from_secs(args.timeout));
    }

    let orchestrator = Orchestrator::new(config, client, Box::new(source), aggregator)?;

    // Ctrl+C cancels the run cooperatively; in-flight queries finish
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, cancelling run");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await?;
    if report.interrupted {
        tracing::warn!("run interrupted; summary covers completed work only");
    }
    println!("{}", report.summary.table());

    Ok(())
}

async fn ping(args: DbArgs) -> Result<()> {
    let client = connect(&args, 1, Duration::from_secs(30))?;
    client.ping().await.context("ping failed")?;
    tracing::info!("database is reachable");

    let sample = Query::new(
        "host_000010",
        chrono_parse("2017-01-01 00:00:00")?,
        chrono_parse("2017-01-01 00:01:00")?,
    );
    let response = client
        .execute(&sample.build())
        .await
        .context("sample query failed")?;
    tracing::info!(duration = ?response.duration, "sample query completed");

    Ok(())
}

fn chrono_parse(timestamp: &str) -> Result<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(timestamp, tsbench_core::query::TIMESTAMP_FORMAT)
        .context("invalid timestamp literal")
}
