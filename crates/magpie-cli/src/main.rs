use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use magpie_client::{ArchiveClient, GatewayClient};
use magpie_core::bucket::{self, BucketSpec, Metric, TimeBasis};
use magpie_core::traits::RecordStore;
use magpie_core::{
    IngestStats, IngestStatus, IngestionPipeline, MagpieConfig, TracingReporter, load_config,
};
use magpie_db::SqliteRecordStore;

/// Default archive service base URL.
const DEFAULT_ARCHIVE_URL: &str = "https://api.pushshift.io";

#[derive(Parser)]
#[command(name = "magpie", version, about = "Submission history crawler and aggregator")]
struct Cli {
    /// Path to magpie.toml (defaults to ~/.config/magpie/magpie.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a collection's submission history into the local store
    Ingest {
        /// Collection (subreddit) name
        collection: String,

        /// Older bound of the range (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        from: String,

        /// Newer bound of the range; defaults to now
        #[arg(long)]
        to: Option<String>,

        /// Optional free-text search filter
        #[arg(long)]
        query: Option<String>,
    },

    /// Compute time-bucketed statistics over stored records
    Stats {
        /// Collection (subreddit) name
        collection: String,

        /// Bucket width in hours
        #[arg(long, default_value_t = 24.0)]
        bin_size_hours: f64,

        /// Distance between bucket centers in hours; defaults to the width
        #[arg(long)]
        step_hours: Option<f64>,

        /// Metric to aggregate
        #[arg(long, value_enum, default_value_t = CliMetric::Count)]
        metric: CliMetric,

        /// Normalize each bucket by its record count
        #[arg(long)]
        per_post: bool,

        /// Aggregate over hour of day instead of absolute time
        #[arg(long)]
        time_of_day: bool,

        /// With --time-of-day, produce one series per weekday
        #[arg(long)]
        week_separated: bool,

        /// Include removed/deleted submissions
        #[arg(long)]
        include_removed: bool,

        /// Older bound of the selection (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Newer bound of the selection (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliMetric {
    Count,
    Comments,
    Score,
    Interactions,
}

impl From<CliMetric> for Metric {
    fn from(m: CliMetric) -> Self {
        match m {
            CliMetric::Count => Metric::Count,
            CliMetric::Comments => Metric::Comments,
            CliMetric::Score => Metric::Score,
            CliMetric::Interactions => Metric::Interactions,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        // Known application errors get their friendlier message
        match e.downcast_ref::<magpie_core::AppError>() {
            Some(app) => eprintln!("{}", app.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config)
        .context("Failed to load configuration")?
        .unwrap_or_default();

    match cli.command {
        Command::Ingest {
            collection,
            from,
            to,
            query,
        } => {
            ingest(&config, &collection, &from, to.as_deref(), query.as_deref()).await?;
        }
        Command::Stats {
            collection,
            bin_size_hours,
            step_hours,
            metric,
            per_post,
            time_of_day,
            week_separated,
            include_removed,
            from,
            to,
        } => {
            stats(
                &config,
                &collection,
                bin_size_hours,
                step_hours,
                metric.into(),
                per_post,
                time_of_day,
                week_separated,
                include_removed,
                from.as_deref(),
                to.as_deref(),
            )
            .await?;
        }
    }

    Ok(())
}

async fn ingest(
    config: &MagpieConfig,
    collection: &str,
    from: &str,
    to: Option<&str>,
    query: Option<&str>,
) -> anyhow::Result<()> {
    let end_epoch = parse_epoch(from).context("Invalid --from date")?;
    let start_epoch = match to {
        Some(s) => parse_epoch(s).context("Invalid --to date")?,
        None => Utc::now().timestamp(),
    };

    let credentials = gateway_credentials(config)?;

    let user_agent = credentials.user_agent.clone();
    let archive = ArchiveClient::new(DEFAULT_ARCHIVE_URL, &user_agent)?;
    let gateway = GatewayClient::new(
        &credentials.client_id,
        &credentials.client_secret,
        &user_agent,
    )?;
    let store = SqliteRecordStore::connect(&config.database_path)
        .await
        .context("Failed to open database")?;
    store.health_check().await?;

    let pipeline = IngestionPipeline::with_config(
        archive,
        gateway,
        store,
        config.ingest.to_ingest_config(),
    );

    // Ctrl-C cancels cleanly; progress so far is already committed
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current chunk...");
            signal_token.cancel();
        }
    });

    info!(collection, start_epoch, end_epoch, "Starting ingestion");
    let result = pipeline
        .ingest_collection_cancellable(
            collection,
            query,
            start_epoch,
            end_epoch,
            &TracingReporter,
            cancel_token,
        )
        .await?;

    print_ingest_summary(collection, &result.stats, result.status);
    Ok(())
}

/// Gateway credentials from the config file, overridable via the
/// MAGPIE_CLIENT_ID / MAGPIE_CLIENT_SECRET environment variables.
fn gateway_credentials(config: &MagpieConfig) -> anyhow::Result<magpie_core::GatewayConfig> {
    let env_id = std::env::var("MAGPIE_CLIENT_ID").ok();
    let env_secret = std::env::var("MAGPIE_CLIENT_SECRET").ok();

    if let (Some(client_id), Some(client_secret)) = (env_id, env_secret) {
        let user_agent = config
            .gateway
            .as_ref()
            .map(|g| g.user_agent.clone())
            .unwrap_or_else(|| concat!("magpie/", env!("CARGO_PKG_VERSION")).to_string());
        return Ok(magpie_core::GatewayConfig {
            client_id,
            client_secret,
            user_agent,
        });
    }

    Ok(config.require_gateway()?.clone())
}

fn print_ingest_summary(collection: &str, stats: &IngestStats, status: IngestStatus) {
    println!("Ingestion {} for '{}'", status.as_str(), collection);
    println!("  Records upserted:  {}", stats.records_upserted);
    println!("  Candidates seen:   {}", stats.candidates_seen);
    println!("  Attrition:         {}", stats.attrition());
    println!("  Pages fetched:     {}", stats.pages_fetched);
    println!("  Pages skipped:     {}", stats.pages_skipped);
    println!("  Dead-zone skips:   {}", stats.dead_zone_skips);
    println!("  Chunks skipped:    {}", stats.chunks_skipped);
}

#[allow(clippy::too_many_arguments)]
async fn stats(
    config: &MagpieConfig,
    collection: &str,
    bin_size_hours: f64,
    step_hours: Option<f64>,
    metric: Metric,
    per_post: bool,
    time_of_day: bool,
    week_separated: bool,
    include_removed: bool,
    from: Option<&str>,
    to: Option<&str>,
) -> anyhow::Result<()> {
    let store = SqliteRecordStore::connect(&config.database_path)
        .await
        .context("Failed to open database")?;

    let range = match (from, to) {
        (Some(f), Some(t)) => Some((
            parse_epoch(f).context("Invalid --from date")?,
            parse_epoch(t).context("Invalid --to date")?,
        )),
        (Some(f), None) => Some((
            parse_epoch(f).context("Invalid --from date")?,
            Utc::now().timestamp(),
        )),
        (None, Some(_)) => anyhow::bail!("--to requires --from"),
        (None, None) => None,
    };

    let records = store.select(collection, range, include_removed).await?;
    if records.is_empty() {
        println!("No records stored for '{}'", collection);
        return Ok(());
    }
    info!(count = records.len(), collection, "Aggregating records");

    if time_of_day {
        let mut spec = BucketSpec::time_of_day(bin_size_hours);
        if let Some(step) = step_hours {
            spec = spec.with_step(step);
        }

        if week_separated {
            let series =
                bucket::aggregate_week_separated(&records, &spec, metric, per_post, TimeBasis::Utc)?;
            for (weekday, day_series) in &series {
                println!("{}:", weekday);
                print_series(&day_series.edges, &day_series.values, |e| {
                    format!("{:5.2}h", e)
                });
            }
        } else {
            let series =
                bucket::aggregate_time_of_day(&records, &spec, metric, per_post, TimeBasis::Utc)?;
            print_series(&series.edges, &series.values, |e| format!("{:5.2}h", e));
        }
        return Ok(());
    }

    // Absolute mode: default the range to the stored extremes. Records are
    // ordered ascending, so first/last are min/max.
    let (start, end) = match range {
        Some((s, e)) => (s as f64, e as f64),
        None => (
            records[0].created_utc as f64,
            // Upper bound is exclusive; nudge past the newest record
            (records[records.len() - 1].created_utc + 1) as f64,
        ),
    };

    let mut spec = BucketSpec::new(start, end, bin_size_hours * 3600.0);
    if let Some(step) = step_hours {
        spec = spec.with_step(step * 3600.0);
    }

    let series = bucket::aggregate_absolute(&records, &spec, metric, per_post, TimeBasis::Utc)?;
    print_series(&series.edges, &series.values, |e| {
        DateTime::<Utc>::from_timestamp(e as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| format!("{}", e))
    });

    Ok(())
}

fn print_series<F: Fn(f64) -> String>(edges: &[f64], values: &[f64], fmt_edge: F) {
    for (edge, value) in edges.iter().zip(values.iter()) {
        if value.is_nan() {
            println!("  {}  -", fmt_edge(*edge));
        } else {
            println!("  {}  {:.2}", fmt_edge(*edge), value);
        }
    }
}

/// Parses an RFC 3339 timestamp or a bare YYYY-MM-DD date (midnight UTC).
fn parse_epoch(s: &str) -> anyhow::Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Expected RFC 3339 or YYYY-MM-DD, got '{}'", s))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid midnight for date")?;
    Ok(midnight.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_epoch_rfc3339() {
        let epoch = parse_epoch("2020-09-13T12:26:40+00:00").unwrap();
        assert_eq!(epoch, 1600000000);
    }

    #[test]
    fn test_parse_epoch_bare_date() {
        let epoch = parse_epoch("1970-01-02").unwrap();
        assert_eq!(epoch, 86400);
    }

    #[test]
    fn test_parse_epoch_rejects_garbage() {
        assert!(parse_epoch("not a date").is_err());
    }

    #[test]
    fn test_cli_parses_ingest() {
        let cli = Cli::try_parse_from([
            "magpie", "ingest", "rust", "--from", "2020-01-01", "--to", "2020-06-01",
        ])
        .unwrap();
        match cli.command {
            Command::Ingest {
                collection, from, ..
            } => {
                assert_eq!(collection, "rust");
                assert_eq!(from, "2020-01-01");
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn test_cli_parses_stats_defaults() {
        let cli = Cli::try_parse_from(["magpie", "stats", "rust"]).unwrap();
        match cli.command {
            Command::Stats {
                bin_size_hours,
                per_post,
                time_of_day,
                ..
            } => {
                assert_eq!(bin_size_hours, 24.0);
                assert!(!per_post);
                assert!(!time_of_day);
            }
            _ => panic!("expected stats command"),
        }
    }
}
