//! Trait definitions for external dependencies.
//!
//! This module defines traits that abstract over the two upstream services and
//! the local store, enabling:
//!
//! - **Testability**: Mock implementations for unit testing
//! - **Flexibility**: Different backend implementations (e.g., a different archive)
//! - **Decoupling**: Core pipeline logic doesn't depend on specific implementations
//!
//! # Example
//!
//! ```ignore
//! use magpie_core::traits::{RecordStore, SearchSource};
//!
//! // Business logic uses traits, not concrete types
//! async fn newest_candidates<S: SearchSource>(
//!     search: &S,
//!     collection: &str,
//! ) -> Result<Vec<magpie_core::CandidateRef>, magpie_core::AppError> {
//!     search.search(collection, None, None, 500).await
//! }
//! ```

use std::future::Future;

use crate::error::AppError;
use crate::record::{CandidateRef, Record};

/// Maximum number of candidates one archive search page may return.
pub const SEARCH_LIMIT_MAX: usize = 500;

/// Maximum number of identifiers one resolve call may carry.
pub const RESOLVE_CHUNK_MAX: usize = 100;

/// Time-ordered search over the archive service (Source A).
///
/// The archive supports only backward paging: each call returns candidates
/// strictly older than `before_epoch`, newest first.
pub trait SearchSource: Send + Sync + Clone {
    /// Searches a collection for candidate submissions.
    ///
    /// # Arguments
    ///
    /// * `collection` - The collection to search
    /// * `query` - Optional free-text filter
    /// * `before_epoch` - Exclusive upper bound on creation time; `None` means "now"
    /// * `limit` - Maximum candidates to return, capped at [`SEARCH_LIMIT_MAX`]
    fn search(
        &self,
        collection: &str,
        query: Option<&str>,
        before_epoch: Option<i64>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<CandidateRef>, AppError>> + Send;
}

/// Authoritative per-item lookup via the gateway service (Source B).
///
/// Implementations own authentication: a token is acquired lazily and
/// refreshed transparently before a resolve call when expired.
pub trait ResolveSource: Send + Sync + Clone {
    /// Resolves full records for the given identifiers.
    ///
    /// Accepts at most [`RESOLVE_CHUNK_MAX`] identifiers per call (an upstream
    /// hard limit - chunking is the caller's job). The result may be shorter
    /// than the input: unresolvable identifiers are dropped, not errors.
    fn resolve(
        &self,
        collection: &str,
        ids: &[String],
    ) -> impl Future<Output = Result<Vec<Record>, AppError>> + Send;
}

/// Store for record persistence and retrieval.
///
/// Implementations must upsert with the field-merge policy: every incoming
/// field overwrites the stored one except `id`, `created`, and `created_utc`,
/// which are immutable once set.
pub trait RecordStore: Send + Sync + Clone {
    /// Inserts or merge-updates a batch of records atomically.
    ///
    /// # Returns
    ///
    /// The number of records written.
    fn upsert_many(
        &self,
        collection: &str,
        records: &[Record],
    ) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Retrieves records for a collection, ordered by `created_utc` ascending.
    ///
    /// # Arguments
    ///
    /// * `range` - Optional `[start, end)` filter on `created_utc`
    /// * `include_removed` - Whether removed/deleted submissions are returned
    fn select(
        &self,
        collection: &str,
        range: Option<(i64, i64)>,
        include_removed: bool,
    ) -> impl Future<Output = Result<Vec<Record>, AppError>> + Send;

    /// Verifies the store is reachable.
    fn health_check(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}
