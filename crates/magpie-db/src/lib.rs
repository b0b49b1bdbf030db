//! magpie db - SQLite persistence for ingested records.
//!
//! Provides [`SqliteRecordStore`], the `RecordStore` implementation used by
//! the CLI. The schema is created on first connect; no migration tooling is
//! needed for a single self-contained table.

pub mod store;

pub use store::SqliteRecordStore;
