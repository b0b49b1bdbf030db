//! Progress reporting for ingestion runs.
//!
//! The pipeline emits [`IngestEvent`]s through a [`ProgressReporter`] so that
//! logging and UI concerns stay out of the core loop. Two implementations are
//! provided: [`SilentReporter`] for tests and embedding, [`TracingReporter`]
//! for CLI use.

use crate::ingest::IngestStats;

/// Events emitted during an ingestion run.
#[derive(Debug)]
pub enum IngestEvent<'a> {
    /// A run began for the given collection and range.
    RunStarted {
        collection: &'a str,
        start_epoch: i64,
        end_epoch: i64,
    },
    /// An archive page was fetched.
    PageFetched {
        before_epoch: i64,
        candidates: usize,
    },
    /// An archive page failed after retries and was skipped.
    PageSkipped { before_epoch: i64 },
    /// An empty page triggered the dead-zone skip.
    DeadZoneSkipped { from_epoch: i64, to_epoch: i64 },
    /// A resolve chunk completed; attrition shows as `resolved < requested`.
    ChunkResolved { requested: usize, resolved: usize },
    /// A resolve chunk failed after retries and was skipped.
    ChunkSkipped { size: usize },
    /// Periodic progress with ETA in seconds (None until a rate is known).
    Progress {
        fraction: f64,
        records_total: u64,
        oldest_epoch: i64,
        eta_seconds: Option<f64>,
    },
    /// The run was cancelled; partial progress is already committed.
    RunCancelled { stats: &'a IngestStats },
    /// The run reached its terminal condition.
    RunFinished { stats: &'a IngestStats },
}

/// Sink for ingestion progress events.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent<'_>);
}

/// Reporter that discards all events.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: IngestEvent<'_>) {}
}

/// Reporter that forwards events to `tracing`.
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: IngestEvent<'_>) {
        match event {
            IngestEvent::RunStarted {
                collection,
                start_epoch,
                end_epoch,
            } => {
                tracing::info!(collection, start_epoch, end_epoch, "Starting ingestion run");
            }
            IngestEvent::PageFetched {
                before_epoch,
                candidates,
            } => {
                tracing::debug!(before_epoch, candidates, "Fetched archive page");
            }
            IngestEvent::PageSkipped { before_epoch } => {
                tracing::warn!(before_epoch, "Archive page failed after retries, skipping");
            }
            IngestEvent::DeadZoneSkipped {
                from_epoch,
                to_epoch,
            } => {
                tracing::info!(from_epoch, to_epoch, "Empty page, skipping over dead zone");
            }
            IngestEvent::ChunkResolved {
                requested,
                resolved,
            } => {
                tracing::debug!(requested, resolved, "Resolved chunk");
            }
            IngestEvent::ChunkSkipped { size } => {
                tracing::warn!(size, "Resolve chunk failed after retries, skipping");
            }
            IngestEvent::Progress {
                fraction,
                records_total,
                oldest_epoch,
                eta_seconds,
            } => {
                let eta = eta_seconds
                    .map(format_eta)
                    .unwrap_or_else(|| "unknown".to_string());
                tracing::info!(
                    "Fetched {:.1}k records, oldest: {}, progress: {:.1}%, ETA: {}",
                    records_total as f64 / 1000.0,
                    oldest_epoch,
                    fraction * 100.0,
                    eta
                );
            }
            IngestEvent::RunCancelled { stats } => {
                tracing::info!(
                    records = stats.records_upserted,
                    "Run cancelled - partial progress saved"
                );
            }
            IngestEvent::RunFinished { stats } => {
                tracing::info!(
                    records = stats.records_upserted,
                    pages = stats.pages_fetched,
                    chunks_skipped = stats.chunks_skipped,
                    "Ingestion run complete"
                );
            }
        }
    }
}

fn format_eta(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{}h {}m {}s", h, m, s)
}
