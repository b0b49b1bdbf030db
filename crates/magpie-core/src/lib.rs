//! magpie core - domain types, ingestion pipeline, and aggregation engine.
//!
//! This crate provides the core functionality for magpie, including:
//!
//! - **Domain models**: [`Record`], [`CandidateRef`]
//! - **Ingestion**: [`IngestionPipeline`] walking a collection's history
//!   backward through time, [`SearchCursor`], [`RetryExecutor`]
//! - **Aggregation**: the `bucket` module's time-bucket engine
//! - **Traits**: [`SearchSource`], [`ResolveSource`], [`RecordStore`] for
//!   dependency injection
//! - **Progress reporting**: [`ProgressReporter`] trait for decoupled
//!   logging/UI
//!
//! # Architecture
//!
//! Business logic is decoupled from I/O concerns through traits:
//!
//! - [`SearchSource`] - time-ordered candidate search (archive service)
//! - [`ResolveSource`] - authoritative per-item lookup (gateway service)
//! - [`RecordStore`] - record persistence with merge-upsert semantics
//!
//! # Example
//!
//! ```ignore
//! use magpie_core::IngestionPipeline;
//! use magpie_core::progress::TracingReporter;
//!
//! let pipeline = IngestionPipeline::new(archive, gateway, store);
//! let reporter = TracingReporter;
//! let stats = pipeline
//!     .ingest_collection_with_progress("rust", None, start, end, &reporter)
//!     .await?;
//! ```

pub mod bucket;
pub mod config;
pub mod cursor;
pub mod error;
pub mod ingest;
pub mod progress;
pub mod record;
pub mod retry;
pub mod traits;

// Configuration
pub use config::{
    GatewayConfig, IngestSettings, MagpieConfig, default_config_path, load_config,
};

// Error handling
pub use error::AppError;

// Domain models
pub use record::{CandidateRef, Record};

// Ingestion pipeline
pub use cursor::SearchCursor;
pub use ingest::{IngestConfig, IngestResult, IngestStats, IngestStatus, IngestionPipeline};
pub use retry::RetryExecutor;

// Aggregation engine
pub use bucket::{Bucket, BucketSeries, BucketSpec, Metric, TimeBasis};

// Progress reporting
pub use progress::{IngestEvent, ProgressReporter, SilentReporter, TracingReporter};

// Traits for dependency injection
pub use traits::{RESOLVE_CHUNK_MAX, RecordStore, ResolveSource, SEARCH_LIMIT_MAX, SearchSource};
