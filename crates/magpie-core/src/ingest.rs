//! Ingestion pipeline reconciling the two upstream services.
//!
//! This module provides the core acquisition logic: walk the archive search
//! backward through time, resolve each candidate batch against the
//! authoritative gateway, and merge the resolved records into the store.
//!
//! # Architecture
//!
//! The [`IngestionPipeline`] is generic over three traits:
//! - [`SearchSource`] - time-ordered candidate search (archive)
//! - [`ResolveSource`] - authoritative per-item lookup (gateway)
//! - [`RecordStore`] - merge-upsert persistence
//!
//! This enables:
//! - **Testing**: Mock implementations for unit tests
//! - **Flexibility**: Different backends behind the same pipeline
//! - **Decoupling**: Core logic independent of HTTP and SQL concerns
//!
//! # Failure Semantics
//!
//! Upstream calls run through a [`RetryExecutor`] in best-effort mode: a
//! search page or resolve chunk that still fails after retries is skipped
//! with a warning, never fatal to the run. Store errors are fatal - losing
//! the store means losing the run's only output. The run terminates when the
//! cursor reaches `end_epoch`, when dead-zone skips climb past `start_epoch`
//! (nothing older exists upstream), or on cancellation.
//!
//! # Cancellation Support
//!
//! `ingest_collection_cancellable` accepts a `CancellationToken` checked
//! before each page, each chunk, and each retry wait. On cancellation the
//! run returns early; everything upserted so far is already committed.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::cursor::SearchCursor;
use crate::error::AppError;
use crate::progress::{IngestEvent, ProgressReporter, SilentReporter};
use crate::retry::RetryExecutor;
use crate::traits::{RESOLVE_CHUNK_MAX, RecordStore, ResolveSource, SEARCH_LIMIT_MAX, SearchSource};

/// Tuning knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Retries per upstream call after the first attempt.
    pub max_retries: u32,
    /// Fixed wait between retry attempts.
    pub wait: std::time::Duration,
    /// Seconds the cursor jumps forward on an empty page.
    pub skip_time: i64,
    /// Candidates requested per search page, capped at [`SEARCH_LIMIT_MAX`].
    pub search_limit: usize,
    /// Identifiers per resolve call, capped at [`RESOLVE_CHUNK_MAX`].
    pub resolve_chunk: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            wait: std::time::Duration::from_secs(5),
            skip_time: 3600,
            search_limit: SEARCH_LIMIT_MAX,
            resolve_chunk: RESOLVE_CHUNK_MAX,
        }
    }
}

/// Outcome classification for one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// The cursor reached the configured end epoch.
    Completed,
    /// Dead-zone skips climbed past the start epoch; the collection holds
    /// nothing older than the point reached.
    Exhausted,
    /// The run was cancelled externally.
    Cancelled,
}

impl IngestStatus {
    /// Returns the string representation for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Completed => "completed",
            IngestStatus::Exhausted => "exhausted",
            IngestStatus::Cancelled => "cancelled",
        }
    }
}

/// Statistics for one ingestion run.
#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    /// Search pages that returned candidates.
    pub pages_fetched: u64,
    /// Search pages dropped after exhausting retries.
    pub pages_skipped: u64,
    /// Empty pages escaped via the cursor skip.
    pub dead_zone_skips: u64,
    /// Candidate identifiers seen across all pages.
    pub candidates_seen: u64,
    /// Resolve chunks that completed (possibly with attrition).
    pub chunks_resolved: u64,
    /// Resolve chunks dropped after exhausting retries.
    pub chunks_skipped: u64,
    /// Records written to the store.
    pub records_upserted: u64,
}

impl IngestStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidates that never became stored records (resolution attrition
    /// plus skipped chunks).
    pub fn attrition(&self) -> u64 {
        self.candidates_seen.saturating_sub(self.records_upserted)
    }
}

/// Result of a cancellable ingestion run.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub stats: IngestStats,
    pub status: IngestStatus,
}

impl IngestResult {
    fn with_status(stats: IngestStats, status: IngestStatus) -> Self {
        Self { stats, status }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == IngestStatus::Cancelled
    }
}

/// Pipeline for ingesting a collection's history into the store.
///
/// # Type Parameters
///
/// * `S` - Search source implementation (e.g., `ArchiveClient`)
/// * `R` - Resolve source implementation (e.g., `GatewayClient`)
/// * `T` - Record store implementation (e.g., `SqliteRecordStore`)
///
/// # Example
///
/// ```ignore
/// use magpie_core::ingest::IngestionPipeline;
///
/// let pipeline = IngestionPipeline::new(archive, gateway, store);
/// let stats = pipeline
///     .ingest_collection("rust", None, start_epoch, end_epoch)
///     .await?;
/// println!("Ingested {} records", stats.records_upserted);
/// ```
pub struct IngestionPipeline<S, R, T>
where
    S: SearchSource,
    R: ResolveSource,
    T: RecordStore,
{
    search: S,
    resolver: R,
    store: T,
    config: IngestConfig,
}

impl<S, R, T> Clone for IngestionPipeline<S, R, T>
where
    S: SearchSource,
    R: ResolveSource,
    T: RecordStore,
{
    fn clone(&self) -> Self {
        Self {
            search: self.search.clone(),
            resolver: self.resolver.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, R, T> IngestionPipeline<S, R, T>
where
    S: SearchSource,
    R: ResolveSource,
    T: RecordStore,
{
    /// Creates a pipeline with default configuration.
    pub fn new(search: S, resolver: R, store: T) -> Self {
        Self {
            search,
            resolver,
            store,
            config: IngestConfig::default(),
        }
    }

    /// Creates a pipeline with custom configuration.
    pub fn with_config(search: S, resolver: R, store: T, config: IngestConfig) -> Self {
        Self {
            search,
            resolver,
            store,
            config,
        }
    }

    /// Ingests a collection's history over `[end_epoch, start_epoch]`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidTimeRange`] for a bad range, or a database
    /// error if the store rejects an upsert. Upstream failures are retried
    /// and skipped, never returned.
    pub async fn ingest_collection(
        &self,
        collection: &str,
        query: Option<&str>,
        start_epoch: i64,
        end_epoch: i64,
    ) -> Result<IngestStats, AppError> {
        let result = self
            .ingest_collection_cancellable(
                collection,
                query,
                start_epoch,
                end_epoch,
                &SilentReporter,
                CancellationToken::new(), // never cancelled
            )
            .await?;
        Ok(result.stats)
    }

    /// Same as [`ingest_collection`](Self::ingest_collection), but emits
    /// progress events through the provided reporter.
    pub async fn ingest_collection_with_progress<P: ProgressReporter>(
        &self,
        collection: &str,
        query: Option<&str>,
        start_epoch: i64,
        end_epoch: i64,
        reporter: &P,
    ) -> Result<IngestStats, AppError> {
        let result = self
            .ingest_collection_cancellable(
                collection,
                query,
                start_epoch,
                end_epoch,
                reporter,
                CancellationToken::new(),
            )
            .await?;
        Ok(result.stats)
    }

    /// Ingests with progress reporting and cancellation support.
    ///
    /// One loop iteration: fetch a search page before the cursor, split the
    /// candidate ids into resolve chunks, resolve and upsert each chunk, then
    /// advance the cursor to the oldest resolved `created_utc`. The resolved
    /// set is authoritative for cursor movement - archive timestamps are
    /// only hints.
    pub async fn ingest_collection_cancellable<P: ProgressReporter>(
        &self,
        collection: &str,
        query: Option<&str>,
        start_epoch: i64,
        end_epoch: i64,
        reporter: &P,
        cancel_token: CancellationToken,
    ) -> Result<IngestResult, AppError> {
        let mut cursor = SearchCursor::new(start_epoch, end_epoch, self.config.skip_time)?;
        let retry = RetryExecutor::new(self.config.max_retries, self.config.wait);
        let search_limit = self.config.search_limit.clamp(1, SEARCH_LIMIT_MAX);
        let chunk_size = self.config.resolve_chunk.clamp(1, RESOLVE_CHUNK_MAX);

        let mut stats = IngestStats::new();
        let run_started = Instant::now();

        reporter.report(IngestEvent::RunStarted {
            collection,
            start_epoch,
            end_epoch,
        });

        while !cursor.finished() {
            if cancel_token.is_cancelled() {
                reporter.report(IngestEvent::RunCancelled { stats: &stats });
                return Ok(IngestResult::with_status(stats, IngestStatus::Cancelled));
            }

            let before = cursor.before();
            let page = retry
                .run_best_effort(&cancel_token, || {
                    self.search
                        .search(collection, query, Some(before), search_limit)
                })
                .await;

            // A page that failed after retries is treated like an empty one:
            // skipped, and the cursor escapes forward.
            let candidates = match page {
                Some(candidates) => {
                    stats.pages_fetched += 1;
                    reporter.report(IngestEvent::PageFetched {
                        before_epoch: before,
                        candidates: candidates.len(),
                    });
                    candidates
                }
                None => {
                    stats.pages_skipped += 1;
                    reporter.report(IngestEvent::PageSkipped {
                        before_epoch: before,
                    });
                    Vec::new()
                }
            };

            if candidates.is_empty() {
                cursor.skip_ahead();
                stats.dead_zone_skips += 1;
                reporter.report(IngestEvent::DeadZoneSkipped {
                    from_epoch: before,
                    to_epoch: cursor.before(),
                });

                if cursor.exhausted() {
                    tracing::warn!(
                        collection,
                        oldest_epoch = cursor.before(),
                        "Nothing older than the start epoch upstream, stopping"
                    );
                    reporter.report(IngestEvent::RunFinished { stats: &stats });
                    return Ok(IngestResult::with_status(stats, IngestStatus::Exhausted));
                }
                continue;
            }

            stats.candidates_seen += candidates.len() as u64;
            let ids: Vec<String> = candidates.into_iter().map(|c| c.id).collect();

            for chunk in ids.chunks(chunk_size) {
                if cancel_token.is_cancelled() {
                    reporter.report(IngestEvent::RunCancelled { stats: &stats });
                    return Ok(IngestResult::with_status(stats, IngestStatus::Cancelled));
                }

                let resolved = retry
                    .run_best_effort(&cancel_token, || self.resolver.resolve(collection, chunk))
                    .await;

                let records = match resolved {
                    Some(records) => records,
                    None => {
                        stats.chunks_skipped += 1;
                        reporter.report(IngestEvent::ChunkSkipped { size: chunk.len() });
                        continue;
                    }
                };

                stats.chunks_resolved += 1;
                reporter.report(IngestEvent::ChunkResolved {
                    requested: chunk.len(),
                    resolved: records.len(),
                });

                // Full attrition: nothing to write, nothing to advance by.
                if records.is_empty() {
                    continue;
                }

                let written = self.store.upsert_many(collection, &records).await?;
                stats.records_upserted += written as u64;

                if let Some(oldest) = records.iter().map(|r| r.created_utc).min() {
                    cursor.advance_to(oldest);
                }

                self.report_progress(reporter, &cursor, &stats, run_started);
            }

            // Stall guard: a page whose resolved batch never moved the cursor
            // (every chunk failed, full attrition, or upstream timestamps at
            // odds with the archive) would refetch the same page forever.
            // Escape it like a dead zone.
            if cursor.before() == before {
                tracing::warn!(
                    before_epoch = before,
                    "Page resolved without cursor progress, skipping ahead"
                );
                cursor.skip_ahead();
                stats.dead_zone_skips += 1;
                reporter.report(IngestEvent::DeadZoneSkipped {
                    from_epoch: before,
                    to_epoch: cursor.before(),
                });

                if cursor.exhausted() {
                    reporter.report(IngestEvent::RunFinished { stats: &stats });
                    return Ok(IngestResult::with_status(stats, IngestStatus::Exhausted));
                }
            }
        }

        reporter.report(IngestEvent::RunFinished { stats: &stats });
        Ok(IngestResult::with_status(stats, IngestStatus::Completed))
    }

    /// Emits a progress event with the observed ingestion rate's ETA.
    ///
    /// The rate is time-range ingested per wall-clock second, so the ETA is
    /// `remaining_range / rate`.
    fn report_progress<P: ProgressReporter>(
        &self,
        reporter: &P,
        cursor: &SearchCursor,
        stats: &IngestStats,
        run_started: Instant,
    ) {
        let elapsed = run_started.elapsed().as_secs_f64();
        let ingested = cursor.ingested_range() as f64;
        let eta_seconds = if elapsed > 0.0 && ingested > 0.0 {
            let rate = ingested / elapsed;
            Some(cursor.remaining_range() as f64 / rate)
        } else {
            None
        };

        reporter.report(IngestEvent::Progress {
            fraction: cursor.fraction_complete(),
            records_total: stats.records_upserted,
            oldest_epoch: cursor.before(),
            eta_seconds,
        });
    }
}
