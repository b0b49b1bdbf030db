//! Integration tests for magpie-core crate.
//!
//! This module contains integration tests that verify the ingestion pipeline
//! (`IngestionPipeline`) using mock implementations of the underlying traits
//! (`SearchSource`, `ResolveSource`, `RecordStore`).
//!
//! Unlike magpie-db which tests against a real SQLite database, these tests
//! use in-memory mocks to verify business logic in isolation.
//!
//! # Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test --test integration -p magpie-core
//! ```

mod integration {
    pub mod common;
    pub mod ingest_tests;
}
